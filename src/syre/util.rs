use chrono::{SecondsFormat, Utc};
use std::path::Path;

/// Current UTC time as an RFC 3339 string, the format Syre stores.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Fresh resource id. Ids are minted once and persisted; never regenerate
/// one for an entity that already has an id on disk.
pub fn new_rid() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Mark a directory hidden. Only Windows needs this; dot folders are hidden
/// elsewhere.
pub fn hide_dir(path: &Path) {
    if !cfg!(windows) {
        return;
    }

    match std::process::Command::new("attrib").arg("+H").arg(path).status() {
        Ok(status) if status.success() => {}
        Ok(status) => {
            tracing::warn!(path = %path.display(), %status, "could not hide folder");
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "could not run attrib");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_is_utc_rfc3339() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn rids_are_unique() {
        assert_ne!(new_rid(), new_rid());
    }
}
