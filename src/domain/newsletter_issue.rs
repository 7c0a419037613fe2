/// Newsletter issue, as carried by publish events
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NewsletterIssue {
    pub subject: String,
    pub body: String,
}

impl NewsletterIssue {
    /// Decode a publish event payload
    pub fn from_payload(payload: &[u8]) -> anyhow::Result<Self> {
        let issue: Self = serde_json::from_slice(payload)?;
        if issue.subject.trim().is_empty() {
            anyhow::bail!("The newsletter subject cannot be empty");
        }
        if issue.body.trim().is_empty() {
            anyhow::bail!("The newsletter body cannot be empty");
        }
        Ok(issue)
    }
}
