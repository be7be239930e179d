use guardrails_shared::{ChatMessage, MessageContent};
use rand::Rng;

/// Truncates a message list to a context budget with a random-window anti-evasion
/// sampling strategy (§4.1 step 1), grounded on `message_truncator.py`.
pub struct MessageTruncator;

impl MessageTruncator {
    pub fn total_content_length(messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| m.content.text_len()).sum()
    }

    /// Picks a uniformly random contiguous slice of `max_len` characters from
    /// `content`, or returns it unchanged if it already fits.
    pub fn random_window(content: &str, max_len: usize) -> String {
        let chars: Vec<char> = content.chars().collect();
        if chars.len() <= max_len {
            return content.to_string();
        }
        let max_start = chars.len() - max_len;
        let start = rand::thread_rng().gen_range(0..=max_start);
        chars[start..start + max_len].iter().collect()
    }

    /// Drops leading non-`user` messages so the first retained message has role
    /// `user`, then truncates to `max_length` total characters if needed.
    pub fn truncate_messages(messages: &[ChatMessage], max_length: usize) -> Vec<ChatMessage> {
        let first_user = messages.iter().position(|m| m.role == "user");
        let Some(first_user) = first_user else {
            return Vec::new();
        };
        let messages = &messages[first_user..];

        if Self::total_content_length(messages) <= max_length {
            return messages.to_vec();
        }

        match messages.last().map(|m| m.role.as_str()) {
            Some("user") => Self::truncate_ending_with_user(messages, max_length),
            _ => Self::truncate_ending_with_assistant(messages, max_length),
        }
    }

    /// Keeps the last `user` message whole (or random-window truncated if it alone
    /// exceeds budget), backfilling earlier messages from the end while budget allows.
    fn truncate_ending_with_user(messages: &[ChatMessage], max_length: usize) -> Vec<ChatMessage> {
        let last = messages.last().expect("non-empty");
        let last_text = last.content.to_plain_text();

        if last_text.chars().count() > max_length {
            return vec![ChatMessage {
                role: last.role.clone(),
                content: MessageContent::Text(Self::random_window(&last_text, max_length)),
            }];
        }

        let mut result = vec![last.clone()];
        let mut budget = max_length - last_text.chars().count();

        for msg in messages[..messages.len() - 1].iter().rev() {
            let len = msg.content.text_len();
            if len > budget {
                break;
            }
            result.insert(0, msg.clone());
            budget -= len;
        }
        result
    }

    /// Preserves the terminal `user -> assistant` pair. If the assistant reply alone
    /// exceeds budget, splits the budget (1/3 user, 2/3 assistant) via random windows;
    /// otherwise keeps the full user turn and random-window-truncates the assistant
    /// turn, then backfills earlier pairs while budget remains.
    fn truncate_ending_with_assistant(messages: &[ChatMessage], max_length: usize) -> Vec<ChatMessage> {
        let last_assistant = messages.last().expect("non-empty");
        let assistant_text = last_assistant.content.to_plain_text();

        let user_idx = messages[..messages.len() - 1]
            .iter()
            .rposition(|m| m.role == "user");

        let Some(user_idx) = user_idx else {
            return vec![ChatMessage {
                role: last_assistant.role.clone(),
                content: MessageContent::Text(Self::random_window(&assistant_text, max_length)),
            }];
        };

        let user_msg = &messages[user_idx];
        let user_text = user_msg.content.to_plain_text();

        if assistant_text.chars().count() > max_length {
            let (user_budget, assistant_budget) = if user_text.chars().count() <= max_length / 3 {
                (user_text.chars().count(), max_length - user_text.chars().count())
            } else {
                (max_length / 3, max_length - max_length / 3)
            };
            return vec![
                ChatMessage {
                    role: user_msg.role.clone(),
                    content: MessageContent::Text(Self::random_window(&user_text, user_budget)),
                },
                ChatMessage {
                    role: last_assistant.role.clone(),
                    content: MessageContent::Text(Self::random_window(&assistant_text, assistant_budget)),
                },
            ];
        }

        let pair_len = user_text.chars().count() + assistant_text.chars().count();

        if pair_len > max_length {
            // Assistant turn alone fits (handled above otherwise); random-window
            // the user turn down to the remaining budget and keep the assistant
            // reply whole, per `message_truncator.py`'s intermediate branch.
            let user_budget = max_length - assistant_text.chars().count();
            return vec![
                ChatMessage {
                    role: user_msg.role.clone(),
                    content: MessageContent::Text(Self::random_window(&user_text, user_budget)),
                },
                last_assistant.clone(),
            ];
        }

        let mut result = vec![user_msg.clone(), last_assistant.clone()];
        let mut budget = max_length.saturating_sub(pair_len);

        for msg in messages[..user_idx].iter().rev() {
            let len = msg.content.text_len();
            if len > budget {
                break;
            }
            result.insert(0, msg.clone());
            budget -= len;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: MessageContent::Text(content.to_string()),
        }
    }

    #[test]
    fn leaves_short_conversation_untouched() {
        let messages = vec![msg("user", "hi"), msg("assistant", "hello")];
        let truncated = MessageTruncator::truncate_messages(&messages, 1000);
        assert_eq!(truncated.len(), 2);
    }

    #[test]
    fn drops_leading_non_user_messages() {
        let messages = vec![msg("system", "you are a bot"), msg("user", "hi")];
        let truncated = MessageTruncator::truncate_messages(&messages, 1000);
        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].role, "user");
    }

    #[test]
    fn truncation_is_length_idempotent() {
        let long = "x".repeat(500);
        let messages = vec![msg("user", &long)];
        let once = MessageTruncator::truncate_messages(&messages, 100);
        let twice = MessageTruncator::truncate_messages(&once, 100);
        assert_eq!(
            MessageTruncator::total_content_length(&once),
            MessageTruncator::total_content_length(&twice)
        );
    }

    #[test]
    fn oversized_pair_with_assistant_fitting_alone_truncates_only_the_user_turn() {
        let messages = vec![msg("user", &"u".repeat(80)), msg("assistant", &"a".repeat(80))];
        let truncated = MessageTruncator::truncate_messages(&messages, 100);
        assert_eq!(MessageTruncator::total_content_length(&truncated), 100);
        assert_eq!(truncated.last().unwrap().content.text_len(), 80);
    }

    #[test]
    fn random_window_returns_full_content_when_it_fits() {
        assert_eq!(MessageTruncator::random_window("short", 100), "short");
    }

    #[test]
    fn random_window_respects_length_cap() {
        let long = "a".repeat(1000);
        let windowed = MessageTruncator::random_window(&long, 50);
        assert_eq!(windowed.chars().count(), 50);
    }
}
