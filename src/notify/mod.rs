use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Out-of-band notification capability (SMS in production). Injected so
/// the assignment flow can be tested without a gateway; a failure here is
/// logged by the caller and never rolls back a committed transition.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, phone: &str, message: &str) -> Result<(), NotifyError>;
}

/// Default notifier: logs the message instead of sending it.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, phone: &str, message: &str) -> Result<(), NotifyError> {
        tracing::info!(phone = %phone, message = %message, "sms notification");
        Ok(())
    }
}

/// Test double that records every message it was asked to send and can be
/// flipped into a failing mode.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<(String, String)>>,
    fail: std::sync::atomic::AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        self.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, phone: &str, message: &str) -> Result<(), NotifyError> {
        if self.fail.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err(NotifyError("gateway unavailable".to_string()));
        }
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push((phone.to_string(), message.to_string()));
        Ok(())
    }
}

/// Country prefix assumed for local numbers without one.
const DEFAULT_COUNTRY_PREFIX: &str = "+225";

/// Strip separators and force an international prefix. Local numbers
/// (leading 0, or bare 10 digits) get the default country code.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '(' | ')' | '-'))
        .collect();

    if let Some(rest) = digits.strip_prefix('+') {
        return format!("+{rest}");
    }
    if let Some(rest) = digits.strip_prefix('0') {
        return format!("{DEFAULT_COUNTRY_PREFIX}{rest}");
    }
    if digits.len() == 10 {
        return format!("{DEFAULT_COUNTRY_PREFIX}{digits}");
    }
    format!("+{digits}")
}

/// A normalized phone is `+` followed by 9 to 15 digits.
pub fn is_valid_phone(phone: &str) -> bool {
    let Some(rest) = phone.strip_prefix('+') else {
        return false;
    };
    (9..=15).contains(&rest.len()) && rest.chars().all(|c| c.is_ascii_digit())
}
