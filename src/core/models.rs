use serde::{Deserialize, Serialize};
use std::fmt;

/* Upper bound on user-visible (non-internal) profiles. */
pub const MAX_PROFILES: usize = 20;

/*
 * Stable identity of a profile record. It is assigned once at creation and is the
 * only key that survives reloads; list position is not an identity.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub u64);

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/*
 * One entry of the authoritative profile list.
 * Derives Serialize and Deserialize since the whole ordered list is written to
 * `profiles.json` as-is. The credential is already encrypted by the caller and is
 * never interpreted here; it is carried byte-for-byte.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: ProfileId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credential: Vec<u8>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub internal: bool,
    #[serde(default, rename = "sync")]
    pub sync_enabled: bool,
}

impl ProfileRecord {
    /* Creates a fresh, inactive, user-visible record with no credential. */
    pub fn new(id: ProfileId, name: String) -> Self {
        ProfileRecord {
            id,
            name,
            credential: Vec::new(),
            active: false,
            internal: false,
            sync_enabled: false,
        }
    }
}

/* Counts the records that are subject to the `MAX_PROFILES` ceiling. */
pub fn visible_profile_count(profiles: &[ProfileRecord]) -> usize {
    profiles.iter().filter(|p| !p.internal).count()
}

pub fn is_at_capacity(profiles: &[ProfileRecord]) -> bool {
    visible_profile_count(profiles) >= MAX_PROFILES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_record_new_defaults() {
        let record = ProfileRecord::new(ProfileId(7), "Main".to_string());
        assert_eq!(record.id, ProfileId(7));
        assert_eq!(record.name, "Main");
        assert!(record.credential.is_empty());
        assert!(!record.active);
        assert!(!record.internal);
        assert!(!record.sync_enabled);
    }

    #[test]
    fn test_profile_record_json_uses_sync_key_and_omits_empty_credential() {
        let mut record = ProfileRecord::new(ProfileId(42), "Alt".to_string());
        record.sync_enabled = true;

        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["id"], 42);
        assert_eq!(json["sync"], true);
        assert!(json.get("credential").is_none());
    }

    #[test]
    fn test_profile_record_missing_flags_default_to_false() {
        let record: ProfileRecord =
            serde_json::from_str(r#"{ "id": 3, "name": "Legacy" }"#).unwrap();
        assert!(!record.active);
        assert!(!record.internal);
        assert!(!record.sync_enabled);
    }

    #[test]
    fn test_capacity_ignores_internal_records() {
        let mut profiles: Vec<ProfileRecord> = (0..MAX_PROFILES as u64)
            .map(|i| ProfileRecord::new(ProfileId(i), format!("P{i}")))
            .collect();
        assert!(is_at_capacity(&profiles));

        profiles[0].internal = true;
        assert_eq!(visible_profile_count(&profiles), MAX_PROFILES - 1);
        assert!(!is_at_capacity(&profiles));
    }
}
