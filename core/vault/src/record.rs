//! Persisted vault records.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::keys::{derive_key, generate_token};
use crate::merge::deep_merge;
use sidegate_common::{Cid, Error, Result, SecretToken};

/// A stored secret.
///
/// Records are immutable once written. `parents` is the flattened payload
/// of the whole ancestor chain as it stood when this record was created;
/// it is never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRecord {
    /// Sole read credential.
    pub token: SecretToken,
    /// Owner of the record; inheritance never crosses CIDs.
    pub cid: Cid,
    /// Snapshot of the merged ancestor payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<Value>,
    /// Key of the immediate ancestor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit: Option<String>,
    /// Caller supplied payload.
    pub data: Value,
}

impl VaultRecord {
    /// Create a record with no ancestor and a fresh token.
    pub fn root(cid: Cid, data: Value) -> Self {
        Self {
            token: generate_token(),
            cid,
            parents: None,
            inherit: None,
            data,
        }
    }

    /// Create a record inheriting from `ancestor`, stored under
    /// `ancestor_key`.
    ///
    /// # Errors
    /// - `AccessDenied` if the ancestor belongs to another CID
    pub fn inheriting(
        cid: Cid,
        data: Value,
        ancestor: &VaultRecord,
        ancestor_key: &str,
    ) -> Result<Self> {
        if ancestor.cid != cid {
            return Err(Error::AccessDenied(
                "cross-cid inheritance forbidden".to_string(),
            ));
        }

        Ok(Self {
            token: generate_token(),
            cid,
            parents: Some(ancestor.resolved_data()),
            inherit: Some(ancestor_key.to_string()),
            data,
        })
    }

    /// The payload with every ancestor merged in.
    pub fn resolved_data(&self) -> Value {
        match &self.parents {
            Some(parents) => deep_merge(parents, &self.data),
            None => deep_merge(&json!({}), &self.data),
        }
    }

    /// Storage key of this record.
    pub fn key(&self) -> Result<String> {
        Ok(derive_key(&self.cid, &self.to_bytes()?))
    }

    /// Serialize to bytes for key derivation.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Serialize to a JSON value for storage.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from a stored JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(id: &str) -> Cid {
        Cid::new(id).unwrap()
    }

    #[test]
    fn test_root_record_has_no_lineage() {
        let record = VaultRecord::root(cid("Qm123"), json!({"answer": "42"}));

        assert!(record.parents.is_none());
        assert!(record.inherit.is_none());
        assert_eq!(record.resolved_data(), json!({"answer": "42"}));
    }

    #[test]
    fn test_inheriting_snapshots_ancestor_chain() {
        let root = VaultRecord::root(cid("Qm123"), json!({"answer": "42", "tags": ["a"]}));
        let child =
            VaultRecord::inheriting(cid("Qm123"), json!({"name": "Bob"}), &root, "k1").unwrap();
        let grandchild =
            VaultRecord::inheriting(cid("Qm123"), json!({"tags": ["c"]}), &child, "k2").unwrap();

        assert_eq!(child.parents, Some(json!({"answer": "42", "tags": ["a"]})));
        assert_eq!(
            grandchild.parents,
            Some(json!({"answer": "42", "name": "Bob", "tags": ["a"]}))
        );
        assert_eq!(
            grandchild.resolved_data(),
            json!({"answer": "42", "name": "Bob", "tags": ["a", "c"]})
        );
        assert_eq!(grandchild.inherit.as_deref(), Some("k2"));
    }

    #[test]
    fn test_cross_cid_inheritance_rejected() {
        let root = VaultRecord::root(cid("Qm123"), json!({}));
        let err = VaultRecord::inheriting(cid("QmOther"), json!({}), &root, "k1").unwrap_err();

        assert!(matches!(err, Error::AccessDenied(_)));
    }

    #[test]
    fn test_serialization_omits_absent_lineage() {
        let record = VaultRecord::root(cid("Qm123"), json!({"answer": "42"}));
        let value = record.to_value().unwrap();

        assert!(value.get("parents").is_none());
        assert!(value.get("inherit").is_none());
        assert_eq!(value["cid"], json!("Qm123"));

        let restored = VaultRecord::from_value(value).unwrap();
        assert_eq!(restored.token, record.token);
        assert_eq!(restored.data, record.data);
    }

    #[test]
    fn test_same_payload_yields_distinct_keys() {
        let a = VaultRecord::root(cid("Qm123"), json!({"answer": "42"}));
        let b = VaultRecord::root(cid("Qm123"), json!({"answer": "42"}));

        assert_ne!(a.key().unwrap(), b.key().unwrap());
    }
}
