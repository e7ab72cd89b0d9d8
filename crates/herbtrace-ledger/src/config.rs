use serde::{Deserialize, Serialize};

use herbtrace_types::{EventKind, OrgId};

/// Which organization may append which event type.
///
/// Collection is reserved to the farmers' organization; processing and
/// quality events share the processors'/labs' organization. There is no
/// finer split between processors and labs at this layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgTopology {
    /// Organization allowed to create batches (`collection` events).
    pub collector_org: OrgId,
    /// Organization allowed to append `processing` and `quality` events.
    pub processor_org: OrgId,
}

impl Default for OrgTopology {
    fn default() -> Self {
        Self {
            collector_org: OrgId::new("Org1MSP"),
            processor_org: OrgId::new("Org2MSP"),
        }
    }
}

impl OrgTopology {
    pub fn new(collector_org: impl Into<String>, processor_org: impl Into<String>) -> Self {
        Self {
            collector_org: OrgId::new(collector_org),
            processor_org: OrgId::new(processor_org),
        }
    }

    /// The organization whose credential authorizes appending `kind`.
    pub fn required_for(&self, kind: EventKind) -> &OrgId {
        match kind {
            EventKind::Collection => &self.collector_org,
            EventKind::Processing | EventKind::Quality => &self.processor_org,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topology_matches_reference_network() {
        let orgs = OrgTopology::default();
        assert_eq!(orgs.required_for(EventKind::Collection).as_str(), "Org1MSP");
        assert_eq!(orgs.required_for(EventKind::Processing).as_str(), "Org2MSP");
        assert_eq!(orgs.required_for(EventKind::Quality).as_str(), "Org2MSP");
    }

    #[test]
    fn topology_is_substitutable() {
        let orgs = OrgTopology::new("Farmers", "Labs");
        assert!(orgs.required_for(EventKind::Collection).matches("Farmers"));
        assert!(orgs.required_for(EventKind::Quality).matches("Labs"));
    }
}
