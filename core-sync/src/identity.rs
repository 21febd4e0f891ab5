use core_auth::HandlerId;
use core_runtime::events::HandlerEvent;
use serde::{Deserialize, Serialize};

/// Descriptive metadata about the connected account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerIdentity {
    pub id: HandlerId,
    pub label: String,
    pub total_capacity: u64,
    pub free_capacity: u64,
}

impl HandlerIdentity {
    pub fn new(id: HandlerId) -> Self {
        Self {
            id,
            label: String::new(),
            total_capacity: 0,
            free_capacity: 0,
        }
    }

    /// Takes the provider's view of the account. An absent label keeps the
    /// current one.
    pub fn apply(&mut self, metadata: &AccountMetadata) {
        if let Some(label) = &metadata.label {
            self.label = label.clone();
        }
        self.total_capacity = metadata.total_capacity;
        self.free_capacity = metadata.free_capacity;
    }

    pub fn used_capacity(&self) -> u64 {
        self.total_capacity.saturating_sub(self.free_capacity)
    }

    pub fn to_event(&self) -> HandlerEvent {
        HandlerEvent::IdentityUpdated {
            handler_id: self.id.to_string(),
            label: self.label.clone(),
            total_capacity: self.total_capacity,
            free_capacity: self.free_capacity,
        }
    }
}

/// Account metadata as reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountMetadata {
    pub label: Option<String>,
    pub total_capacity: u64,
    pub free_capacity: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_metadata() {
        let mut identity = HandlerIdentity::new(HandlerId::new());
        identity.label = "Work drive".to_string();

        identity.apply(&AccountMetadata {
            label: None,
            total_capacity: 5_368_709_120,
            free_capacity: 1_073_741_824,
        });
        assert_eq!(identity.label, "Work drive");
        assert_eq!(identity.used_capacity(), 4_294_967_296);

        identity.apply(&AccountMetadata {
            label: Some("Personal".to_string()),
            total_capacity: 10,
            free_capacity: 20,
        });
        assert_eq!(identity.label, "Personal");
        assert_eq!(identity.used_capacity(), 0);
    }
}
