/// Delivery channel for verification codes and other tenant-facing notices.
/// SMTP delivery is an external collaborator the spec places out of scope (§1
/// "Non-goals"); the logging implementation below is what every deployment gets
/// until a real transport is wired in.
pub trait EmailSender: Send + Sync {
    fn send_verification_code(&self, to: &str, code: &str);
}

pub struct LoggingEmailSender;

impl EmailSender for LoggingEmailSender {
    fn send_verification_code(&self, to: &str, code: &str) {
        tracing::info!(email = to, code, "verification code issued");
    }
}
