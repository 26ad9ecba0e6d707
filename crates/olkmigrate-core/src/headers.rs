//! Message-ID extraction from message sources

use crate::{CoreError, CoreResult};
use mail_parser::MessageParser;
use std::path::Path;

/// Strip one surrounding pair of angle brackets, when both are present
pub fn normalize_message_id(id: &str) -> &str {
    id.strip_prefix('<')
        .and_then(|inner| inner.strip_suffix('>'))
        .unwrap_or(id)
}

/// Read the normalized Message-ID of a message source
///
/// Returns `Ok(None)` when the message has no Message-ID header.
pub fn read_message_id(path: &Path) -> CoreResult<Option<String>> {
    let raw = std::fs::read(path).map_err(|e| extract_error(path, e.to_string()))?;

    let message = MessageParser::default()
        .parse(&raw)
        .ok_or_else(|| extract_error(path, "not an RFC 5322 message".to_string()))?;

    Ok(message
        .message_id()
        .map(|id| normalize_message_id(id.trim()).to_string())
        .filter(|id| !id.is_empty()))
}

fn extract_error(path: &Path, reason: String) -> CoreError {
    CoreError::ExtractError {
        file: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_one_pair() {
        assert_eq!(normalize_message_id("<abc@example.com>"), "abc@example.com");
        assert_eq!(normalize_message_id("abc@example.com"), "abc@example.com");
        assert_eq!(normalize_message_id("<abc@example.com"), "<abc@example.com");
        assert_eq!(normalize_message_id("abc@example.com>"), "abc@example.com>");
        assert_eq!(normalize_message_id("<>"), "");
        assert_eq!(normalize_message_id("<"), "<");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for id in [
            "<abc@example.com>",
            "abc@example.com",
            "<CAF=x+y@mail.gmail.com>",
            "<1234.5678@outlook>",
            "",
        ] {
            let once = normalize_message_id(id);
            assert_eq!(normalize_message_id(once), once);
        }
    }

    #[test]
    fn test_read_message_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.olk15MsgSource");
        std::fs::write(
            &path,
            b"Message-ID: <Abc.123@example.com>\r\nSubject: hi\r\n\r\nbody\r\n",
        )
        .unwrap();

        assert_eq!(
            read_message_id(&path).unwrap().as_deref(),
            Some("Abc.123@example.com")
        );
    }

    #[test]
    fn test_missing_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.olk15MsgSource");
        std::fs::write(&path, b"Subject: no id\r\n\r\nbody\r\n").unwrap();

        assert_eq!(read_message_id(&path).unwrap(), None);
    }

    #[test]
    fn test_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_message_id(&dir.path().join("gone.olk15MsgSource")).unwrap_err();
        match err {
            CoreError::ExtractError { file, .. } => assert_eq!(file, "gone.olk15MsgSource"),
            other => panic!("unexpected error: {}", other),
        }
    }
}
