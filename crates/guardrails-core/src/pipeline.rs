use crate::caches::keyword::KeywordHitResult;
use crate::caches::{KeywordCache, RiskConfigCache, TemplateCache};
use crate::classifier::ClassifierClient;
use crate::data_security::DataSecurityEngine;
use crate::kb::{KnowledgeBaseRetriever, NullKnowledgeBaseRetriever, DEFAULT_SIMILARITY_THRESHOLD};
use crate::truncation::MessageTruncator;
use guardrails_shared::{
    category_display_name, category_risk_level, is_security_category, Action, ChatMessage,
    DataSecurityEntityType, Direction, GuardrailResult, GuardrailResponse, GuardrailSubVerdict,
    KnowledgeBase, RiskLevel,
};
use std::sync::Arc;
use uuid::Uuid;

/// Everything the pipeline produced for one inspection, including fields that do
/// not appear on the wire response but are needed for the detection log record
/// and ban-policy bookkeeping (§4.1).
#[derive(Debug, Clone)]
pub struct PipelineVerdict {
    pub request_id: String,
    pub content: String,
    pub compliance: GuardrailSubVerdict,
    pub security: GuardrailSubVerdict,
    pub data: GuardrailSubVerdict,
    pub overall_risk_level: RiskLevel,
    pub suggest_action: Action,
    pub suggest_answer: Option<String>,
    pub sensitivity_score: Option<f64>,
    pub sensitivity_level: Option<String>,
    pub hit_keywords: Option<Vec<String>>,
    pub model_response: String,
    pub has_image: bool,
}

impl PipelineVerdict {
    pub fn to_response(&self) -> GuardrailResponse {
        GuardrailResponse {
            id: self.request_id.clone(),
            result: GuardrailResult {
                compliance: self.compliance.clone(),
                security: self.security.clone(),
                data: self.data.clone(),
            },
            overall_risk_level: self.overall_risk_level,
            suggest_action: self.suggest_action,
            suggest_answer: self.suggest_answer.clone(),
        }
    }
}

/// Orchestrates the inspection pipeline (§4.1), grounded on `guardrail_service.py`'s
/// `check_guardrails`. Pure function of `(messages, tenant_id, caches,
/// classifier_result)`: performs no DB writes itself — callers enqueue the returned
/// verdict to the async logger.
pub struct GuardrailPipeline {
    keyword_cache: Arc<KeywordCache>,
    template_cache: Arc<TemplateCache>,
    risk_config_cache: Arc<RiskConfigCache>,
    classifier: Arc<ClassifierClient>,
    kb_retriever: Arc<dyn KnowledgeBaseRetriever>,
    max_context_length: usize,
}

impl GuardrailPipeline {
    pub fn new(
        keyword_cache: Arc<KeywordCache>,
        template_cache: Arc<TemplateCache>,
        risk_config_cache: Arc<RiskConfigCache>,
        classifier: Arc<ClassifierClient>,
        max_context_length: usize,
    ) -> Self {
        Self::with_kb_retriever(
            keyword_cache,
            template_cache,
            risk_config_cache,
            classifier,
            max_context_length,
            Arc::new(NullKnowledgeBaseRetriever),
        )
    }

    pub fn with_kb_retriever(
        keyword_cache: Arc<KeywordCache>,
        template_cache: Arc<TemplateCache>,
        risk_config_cache: Arc<RiskConfigCache>,
        classifier: Arc<ClassifierClient>,
        max_context_length: usize,
        kb_retriever: Arc<dyn KnowledgeBaseRetriever>,
    ) -> Self {
        Self {
            keyword_cache,
            template_cache,
            risk_config_cache,
            classifier,
            kb_retriever,
            max_context_length,
        }
    }

    pub async fn check(
        &self,
        tenant_id: Uuid,
        messages: &[ChatMessage],
        direction: Direction,
        entity_types: &[DataSecurityEntityType],
        knowledge_bases: &[KnowledgeBase],
    ) -> PipelineVerdict {
        let request_id = format!("guardrails-{}", Uuid::new_v4().simple());

        // Step 1: truncate to context budget.
        let truncated = MessageTruncator::truncate_messages(messages, self.max_context_length);
        let user_content = extract_user_content(&truncated);
        let has_image = truncated.iter().any(|m| m.content.has_image());

        // Step 2: blacklist / whitelist prefilter.
        if let KeywordHitResult::Hit(hit) = self.keyword_cache.check_blacklist(&user_content, tenant_id).await {
            return self.blacklist_verdict(request_id, &user_content, has_image, hit.list_name, hit.matched_keywords);
        }
        if let KeywordHitResult::Hit(_) = self.keyword_cache.check_whitelist(&user_content, tenant_id).await {
            return self.pass_verdict(request_id, user_content, has_image, "whitelist_hit".to_string());
        }

        // Step 3: data-security scan.
        let data_result = DataSecurityEngine::detect(&user_content, entity_types, direction);

        // Step 4: classifier call.
        let classifier_result = self.classifier.check_messages(&truncated, has_image).await;

        let classifier_result = match classifier_result {
            Ok(v) => v,
            Err(e) => {
                // §4.1 failure semantics: classifier timeout/error -> no_risk, pass.
                return PipelineVerdict {
                    request_id,
                    content: user_content,
                    compliance: GuardrailSubVerdict { risk_level: RiskLevel::NoRisk, categories: vec![] },
                    security: GuardrailSubVerdict { risk_level: RiskLevel::NoRisk, categories: vec![] },
                    data: GuardrailSubVerdict {
                        risk_level: data_result.risk_level,
                        categories: data_result.categories,
                    },
                    overall_risk_level: data_result.risk_level,
                    suggest_action: Action::from_overall_risk(data_result.risk_level),
                    suggest_answer: data_result.anonymized_text,
                    sensitivity_score: None,
                    sensitivity_level: None,
                    hit_keywords: None,
                    model_response: format!("error: {e}"),
                    has_image,
                };
            }
        };

        // Step 5/6: risk-type enable check + sensitivity threshold filtering, then
        // split into compliance vs security.
        let risk_config = self.risk_config_cache.get(tenant_id).await;
        let mut compliance_categories = Vec::new();
        let mut security_categories = Vec::new();

        if let Some(code) = &classifier_result.category_code {
            let enabled = risk_config.is_enabled(code);
            let above_threshold = classifier_result.sensitivity_score >= risk_config.threshold();

            if enabled && above_threshold {
                let name = category_display_name(code).to_string();
                if is_security_category(code) {
                    security_categories.push(name);
                } else {
                    compliance_categories.push(name);
                }
            }
        }

        let compliance_risk = compliance_level(&compliance_categories);
        let security_risk = security_level(&security_categories);
        let overall = RiskLevel::max_of([compliance_risk, security_risk, data_result.risk_level]);
        let suggest_action = Action::from_overall_risk(overall);

        let sensitivity_level = classifier_result
            .category_code
            .as_ref()
            .map(|_| risk_config.sensitivity_trigger_level.clone());

        // Step 7: resolve substitute answer.
        let suggest_answer = match suggest_action {
            Action::Pass => None,
            _ => Some(self.resolve_suggest_answer(
                tenant_id,
                &user_content,
                &data_result.anonymized_text,
                &compliance_categories,
                &security_categories,
                knowledge_bases,
            ).await),
        };

        PipelineVerdict {
            request_id,
            content: user_content,
            compliance: GuardrailSubVerdict { risk_level: compliance_risk, categories: compliance_categories },
            security: GuardrailSubVerdict { risk_level: security_risk, categories: security_categories },
            data: GuardrailSubVerdict {
                risk_level: data_result.risk_level,
                categories: data_result.categories,
            },
            overall_risk_level: overall,
            suggest_action,
            suggest_answer,
            sensitivity_score: Some(classifier_result.sensitivity_score),
            sensitivity_level,
            hit_keywords: None,
            model_response: classifier_result
                .category_code
                .map(|c| format!("unsafe\n{c}"))
                .unwrap_or_else(|| "safe".to_string()),
            has_image,
        }
    }

    /// Substitute answer preference order (§4.1 step 7): a data-security
    /// anonymization of the input, else the template resolver over triggered
    /// categories by descending risk priority.
    async fn resolve_suggest_answer(
        &self,
        tenant_id: Uuid,
        user_query: &str,
        anonymized_text: &Option<String>,
        compliance_categories: &[String],
        security_categories: &[String],
        knowledge_bases: &[KnowledgeBase],
    ) -> String {
        if let Some(text) = anonymized_text {
            return text.clone();
        }

        let mut categories: Vec<String> = compliance_categories
            .iter()
            .chain(security_categories.iter())
            .cloned()
            .collect();
        categories.sort_by_key(|name| {
            std::cmp::Reverse(
                guardrails_shared::category_code_from_display_name(name)
                    .map(category_risk_level)
                    .unwrap_or(RiskLevel::NoRisk),
            )
        });

        if !user_query.is_empty() {
            for category in &categories {
                let Some(code) = guardrails_shared::category_code_from_display_name(category) else {
                    continue;
                };
                let kb = knowledge_bases
                    .iter()
                    .find(|kb| kb.is_active && kb.category == code && (kb.tenant_id == tenant_id || kb.is_global));
                if let Some(kb) = kb {
                    if let Some(m) = self.kb_retriever.retrieve(kb, user_query, DEFAULT_SIMILARITY_THRESHOLD) {
                        return m.answer;
                    }
                }
            }
        }

        self.template_cache.get_suggest_answer(&categories, Some(tenant_id)).await
    }

    fn blacklist_verdict(
        &self,
        request_id: String,
        content: &str,
        has_image: bool,
        list_name: String,
        matched_keywords: Vec<String>,
    ) -> PipelineVerdict {
        PipelineVerdict {
            request_id,
            content: content.to_string(),
            compliance: GuardrailSubVerdict { risk_level: RiskLevel::High, categories: vec![list_name.clone()] },
            security: GuardrailSubVerdict { risk_level: RiskLevel::NoRisk, categories: vec![] },
            data: GuardrailSubVerdict { risk_level: RiskLevel::NoRisk, categories: vec![] },
            overall_risk_level: RiskLevel::High,
            suggest_action: Action::Reject,
            suggest_answer: Some(format!("Sorry, I can't provide content involving {list_name}.")),
            sensitivity_score: None,
            sensitivity_level: None,
            hit_keywords: Some(matched_keywords),
            model_response: "blacklist_hit".to_string(),
            has_image,
        }
    }

    fn pass_verdict(&self, request_id: String, content: String, has_image: bool, model_response: String) -> PipelineVerdict {
        PipelineVerdict {
            request_id,
            content,
            compliance: GuardrailSubVerdict { risk_level: RiskLevel::NoRisk, categories: vec![] },
            security: GuardrailSubVerdict { risk_level: RiskLevel::NoRisk, categories: vec![] },
            data: GuardrailSubVerdict { risk_level: RiskLevel::NoRisk, categories: vec![] },
            overall_risk_level: RiskLevel::NoRisk,
            suggest_action: Action::Pass,
            suggest_answer: None,
            sensitivity_score: None,
            sensitivity_level: None,
            hit_keywords: None,
            model_response,
            has_image,
        }
    }
}

fn compliance_level(categories: &[String]) -> RiskLevel {
    category_levels(categories)
}

fn security_level(categories: &[String]) -> RiskLevel {
    category_levels(categories)
}

fn category_levels(categories: &[String]) -> RiskLevel {
    RiskLevel::max_of(
        categories
            .iter()
            .filter_map(|name| guardrails_shared::category_code_from_display_name(name))
            .map(category_risk_level),
    )
}

/// Single user message vs multi-turn conversation formatting with role labels,
/// grounded on `_extract_user_content` in `guardrail_service.py`.
pub fn extract_user_content(messages: &[ChatMessage]) -> String {
    let user_messages: Vec<&ChatMessage> = messages.iter().filter(|m| m.role == "user").collect();

    if user_messages.len() == 1 && messages.len() == 1 {
        return user_messages[0].content.to_plain_text();
    }

    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content.to_plain_text()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardrails_shared::MessageContent;

    fn msg(role: &str, text: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: MessageContent::Text(text.to_string()),
        }
    }

    #[test]
    fn single_user_message_extracted_verbatim() {
        let messages = vec![msg("user", "hello there")];
        assert_eq!(extract_user_content(&messages), "hello there");
    }

    #[test]
    fn multi_turn_conversation_gets_role_labels() {
        let messages = vec![msg("user", "hi"), msg("assistant", "hello")];
        assert_eq!(extract_user_content(&messages), "user: hi\nassistant: hello");
    }

    #[test]
    fn action_from_risk_matches_invariant_table() {
        assert_eq!(Action::from_overall_risk(RiskLevel::NoRisk), Action::Pass);
        assert_eq!(Action::from_overall_risk(RiskLevel::Low), Action::Replace);
        assert_eq!(Action::from_overall_risk(RiskLevel::Medium), Action::Replace);
        assert_eq!(Action::from_overall_risk(RiskLevel::High), Action::Reject);
    }
}
