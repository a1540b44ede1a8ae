//! Alert rendering.

use serde::Serialize;

use crate::errors::ClassifiedError;

const HEADER: &str = "Faucet Service";

/// Longest raw error text copied into an alert.
const MAX_DETAIL_CHARS: usize = 500;

/// Static context shared by every alert of this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertContext {
    pub network_name: String,
    pub funding_account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertField {
    pub label: String,
    pub value: String,
}

/// A rendered operator alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub header: String,
    pub context: String,
    pub fields: Vec<AlertField>,
}

impl Alert {
    pub fn field(&self, label: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.label == label)
            .map(|f| f.value.as_str())
    }
}

fn field(label: &str, value: impl Into<String>) -> AlertField {
    AlertField {
        label: label.to_string(),
        value: value.into(),
    }
}

fn truncate(detail: &str) -> String {
    if detail.chars().count() <= MAX_DETAIL_CHARS {
        detail.to_string()
    } else {
        let cut: String = detail.chars().take(MAX_DETAIL_CHARS).collect();
        format!("{}…", cut)
    }
}

/// Render the alert for `error`.
pub fn render_alert(error: &ClassifiedError, ctx: &AlertContext) -> Alert {
    let (name, message) = match error {
        ClassifiedError::InsufficientFunds => (
            "InsufficientBalance Error",
            "The account does not have enough funds".to_string(),
        ),
        ClassifiedError::ModuleDispatch { .. } => (
            "Dispatch Error",
            "A dispatch error occurred when funding".to_string(),
        ),
        ClassifiedError::TransientConnection { message } => (
            "Transient Connection Error",
            format!("The node rejected the transfer again after reconnecting: {}", truncate(message)),
        ),
        ClassifiedError::UnknownDispatch { raw } => (
            "Unknown Dispatch Error",
            format!("An unknown error occurred when funding: {}", truncate(raw)),
        ),
        ClassifiedError::AddressFormat { reason, .. } => ("Address Format Error", truncate(reason)),
        ClassifiedError::RateLimited { remaining_secs } => (
            "Rate Limit Error",
            format!("Retry allowed in {} seconds", remaining_secs),
        ),
    };

    let mut fields = vec![
        field("Error Name", name),
        field("From Account", ctx.funding_account.clone()),
        field("Message", message),
    ];
    if let ClassifiedError::ModuleDispatch { section, method } = error {
        fields.push(field("Error Section", section.clone()));
        fields.push(field("Error Method", method.clone()));
    }

    Alert {
        header: HEADER.to_string(),
        context: format!(
            "Encountered error when depositing new funds for network *'{}'*",
            ctx.network_name
        ),
        fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AlertContext {
        AlertContext {
            network_name: "westend".into(),
            funding_account: "5Faucet".into(),
        }
    }

    #[test]
    fn test_insufficient_funds_alert() {
        let alert = render_alert(&ClassifiedError::InsufficientFunds, &ctx());
        assert_eq!(alert.header, "Faucet Service");
        assert!(alert.context.contains("*'westend'*"));
        assert_eq!(alert.field("Error Name"), Some("InsufficientBalance Error"));
        assert_eq!(alert.field("From Account"), Some("5Faucet"));
        assert_eq!(alert.field("Error Section"), None);
    }

    #[test]
    fn test_module_dispatch_alert_names_location() {
        let alert = render_alert(
            &ClassifiedError::ModuleDispatch {
                section: "balances".into(),
                method: "transfer".into(),
            },
            &ctx(),
        );
        assert_eq!(alert.field("Error Section"), Some("balances"));
        assert_eq!(alert.field("Error Method"), Some("transfer"));
    }

    #[test]
    fn test_long_detail_is_truncated() {
        let raw = "x".repeat(2_000);
        let alert = render_alert(&ClassifiedError::UnknownDispatch { raw }, &ctx());
        let message = alert.field("Message").unwrap();
        assert!(message.chars().count() < 600);
        assert!(message.ends_with('…'));
    }
}
