/*
 * This module holds the error type shared by the profile store and the active
 * configuration controller, together with the rules for profile names.
 *
 * A profile name ends up as part of a file name on disk (the payload file of the
 * profile), so user input is filtered down to characters that are legal in a path
 * component. New names produced by create, import, and clone are probed against the
 * current list so that they do not collide with an existing name at creation time.
 */
use super::models::ProfileId;
use std::io;
use std::path::PathBuf;

pub const NEW_PROFILE_BASE_NAME: &str = "New Profile";
pub const IMPORTED_PROFILE_BASE_NAME: &str = "Imported Profile";

// Characters commonly forbidden in file names.
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', '<', '>', ':', '"', '|', '?', '*', '\0'];
const MAX_NAME_PROBES: u32 = 10_000;

#[derive(Debug)]
pub enum ProfileError {
    Io(io::Error),
    Serde(serde_json::Error),
    NoDataDirectory,
    ProfileNotFound(ProfileId),
    InvalidProfileName(String),
    DuplicateNameExhausted(String),
    SyncStillEnabled(ProfileId),
    Mirror(String),
    MissingPayload(String),
    ChecksumMismatch(PathBuf),
}

impl From<io::Error> for ProfileError {
    fn from(err: io::Error) -> Self {
        ProfileError::Io(err)
    }
}

impl From<serde_json::Error> for ProfileError {
    fn from(err: serde_json::Error) -> Self {
        ProfileError::Serde(err)
    }
}

impl std::fmt::Display for ProfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileError::Io(e) => write!(f, "I/O error: {e}"),
            ProfileError::Serde(e) => write!(f, "Serialization/Deserialization error: {e}"),
            ProfileError::NoDataDirectory => {
                write!(f, "Could not determine the data directory for profiles")
            }
            ProfileError::ProfileNotFound(id) => write!(f, "Profile not found: {id}"),
            ProfileError::InvalidProfileName(name) => write!(
                f,
                "Invalid profile name: '{name}'. It is empty after removing forbidden characters."
            ),
            ProfileError::DuplicateNameExhausted(base) => {
                write!(f, "No free profile name could be found for '{base}'")
            }
            ProfileError::SyncStillEnabled(id) => {
                write!(f, "Profile {id} still has sync enabled and cannot be removed")
            }
            ProfileError::Mirror(msg) => write!(f, "Remote mirror error: {msg}"),
            ProfileError::MissingPayload(name) => {
                write!(f, "Profile '{name}' has no settings")
            }
            ProfileError::ChecksumMismatch(path) => {
                write!(f, "Copied payload {path:?} does not match its source")
            }
        }
    }
}

impl std::error::Error for ProfileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProfileError::Io(e) => Some(e),
            ProfileError::Serde(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProfileError>;

pub fn is_valid_profile_name_char(c: char) -> bool {
    !FORBIDDEN_NAME_CHARS.contains(&c)
}

/*
 * Strips characters that are illegal in a path component and trims surrounding
 * whitespace. An empty result means the input cannot be used as a name.
 */
pub fn filter_profile_name(name: &str) -> String {
    name.chars()
        .filter(|c| is_valid_profile_name_char(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

pub fn validate_profile_name(name: &str) -> Result<String> {
    let filtered = filter_profile_name(name);
    if filtered.is_empty() {
        return Err(ProfileError::InvalidProfileName(name.to_string()));
    }
    Ok(filtered)
}

/*
 * Returns `base` if it is free, otherwise the first free `"base (n)"` with n
 * counting up from 1. `is_taken` is queried against the list of the current
 * critical section.
 */
pub fn probe_free_name<F>(base: &str, is_taken: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    if !is_taken(base) {
        return Ok(base.to_string());
    }
    probe_numbered_name(base, is_taken)
}

/*
 * Clones never reuse the bare source name; the first candidate is already
 * numbered.
 */
pub fn probe_clone_name<F>(source_name: &str, is_taken: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    probe_numbered_name(source_name, is_taken)
}

fn probe_numbered_name<F>(base: &str, is_taken: F) -> Result<String>
where
    F: Fn(&str) -> bool,
{
    for number in 1..=MAX_NAME_PROBES {
        let candidate = format!("{base} ({number})");
        if !is_taken(&candidate) {
            return Ok(candidate);
        }
    }
    Err(ProfileError::DuplicateNameExhausted(base.to_string()))
}

#[cfg(test)]
mod profile_tests {
    use super::*;
    use std::collections::HashSet;

    fn taken(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_filter_profile_name_strips_forbidden_characters() {
        assert_eq!(filter_profile_name("My/Profile"), "MyProfile");
        assert_eq!(filter_profile_name("a<b>c:d\"e|f?g*h\\i"), "abcdefghi");
        assert_eq!(filter_profile_name("  Spaced Out  "), "Spaced Out");
        assert_eq!(filter_profile_name("with\0nul"), "withnul");
        assert_eq!(filter_profile_name("Keep (1) - dots.ok"), "Keep (1) - dots.ok");
    }

    #[test]
    fn test_validate_profile_name_rejects_empty_results() {
        assert!(matches!(
            validate_profile_name(""),
            Err(ProfileError::InvalidProfileName(_))
        ));
        assert!(matches!(
            validate_profile_name(" /:* "),
            Err(ProfileError::InvalidProfileName(_))
        ));
        assert_eq!(validate_profile_name(" Main ").unwrap(), "Main");
    }

    #[test]
    fn test_probe_free_name_prefers_base_then_numbers() {
        let existing = taken(&[]);
        assert_eq!(
            probe_free_name(NEW_PROFILE_BASE_NAME, |n| existing.contains(n)).unwrap(),
            "New Profile"
        );

        let existing = taken(&["New Profile", "New Profile (1)"]);
        assert_eq!(
            probe_free_name(NEW_PROFILE_BASE_NAME, |n| existing.contains(n)).unwrap(),
            "New Profile (2)"
        );
    }

    #[test]
    fn test_probe_free_name_fills_gaps() {
        let existing = taken(&["Imported Profile", "Imported Profile (2)"]);
        assert_eq!(
            probe_free_name(IMPORTED_PROFILE_BASE_NAME, |n| existing.contains(n)).unwrap(),
            "Imported Profile (1)"
        );
    }

    #[test]
    fn test_probe_clone_name_never_returns_source_name() {
        let existing = taken(&["Main"]);
        assert_eq!(
            probe_clone_name("Main", |n| existing.contains(n)).unwrap(),
            "Main (1)"
        );

        let existing = taken(&["Main", "Main (1)"]);
        assert_eq!(
            probe_clone_name("Main", |n| existing.contains(n)).unwrap(),
            "Main (2)"
        );
    }

    #[test]
    fn test_probe_reports_exhaustion() {
        let result = probe_free_name("Busy", |_| true);
        assert!(matches!(result, Err(ProfileError::DuplicateNameExhausted(ref b)) if b == "Busy"));
    }
}
