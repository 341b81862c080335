use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub is_verified: bool,
    pub expected_hash: String,
    pub current_hash: String,
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Upload,
    Sign,
    View,
    Download,
    Modify,
    Email,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Upload => "upload",
            AuditAction::Sign => "sign",
            AuditAction::View => "view",
            AuditAction::Download => "download",
            AuditAction::Modify => "modify",
            AuditAction::Email => "email",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "upload" => Some(AuditAction::Upload),
            "sign" => Some(AuditAction::Sign),
            "view" => Some(AuditAction::View),
            "download" => Some(AuditAction::Download),
            "modify" => Some(AuditAction::Modify),
            "email" => Some(AuditAction::Email),
            _ => None,
        }
    }
}

/// One entry of a document's audit trail. Storing it is the caller's job; this crate only
/// gives it a stable JSON shape and a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub document_id: String,
    pub action: AuditAction,
    pub original_hash: Option<String>,
    pub new_hash: Option<String>,
    pub field_count: Option<usize>,
    pub timestamp_ms: u64,
}

impl AuditRecord {
    pub fn new(document_id: impl Into<String>, action: AuditAction, timestamp_ms: u64) -> Self {
        Self {
            document_id: document_id.into(),
            action,
            original_hash: None,
            new_hash: None,
            field_count: None,
            timestamp_ms,
        }
    }

    pub fn with_hashes(mut self, original: impl Into<String>, new: Option<String>) -> Self {
        self.original_hash = Some(original.into());
        self.new_hash = new;
        self
    }

    pub fn with_field_count(mut self, count: usize) -> Self {
        self.field_count = Some(count);
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "documentId": self.document_id,
            "action": self.action.as_str(),
            "originalHash": self.original_hash,
            "newHash": self.new_hash,
            "details": { "fieldCount": self.field_count },
            "timestamp": self.timestamp_ms,
        })
    }

    pub fn fingerprint(&self) -> String {
        audit_hash(&self.to_json())
    }
}

fn hex_digest(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_digest(&hasher.finalize())
}

pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex_digest(&hasher.finalize()))
}

pub fn hash_file(path: impl AsRef<Path>) -> io::Result<String> {
    let file = File::open(path)?;
    hash_reader(BufReader::new(file))
}

/// Fingerprint of a JSON value over its compact serialization. Key order is whatever the
/// value holds, so callers should build records through `AuditRecord::to_json`.
pub fn audit_hash(data: &Value) -> String {
    hash_bytes(data.to_string().as_bytes())
}

pub fn verify(expected_hash: &str, current: &[u8]) -> IntegrityReport {
    report(expected_hash, hash_bytes(current))
}

pub fn verify_file(expected_hash: &str, path: impl AsRef<Path>) -> io::Result<IntegrityReport> {
    Ok(report(expected_hash, hash_file(path)?))
}

/// Hashes are compared byte for byte; only the lowercase form `hash_bytes` produces matches.
fn report(expected_hash: &str, current_hash: String) -> IntegrityReport {
    let changed = expected_hash != current_hash;
    IntegrityReport {
        is_verified: !changed,
        expected_hash: expected_hash.to_string(),
        current_hash,
        changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hash_bytes_matches_known_digest() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn hash_is_stable_and_sensitive_to_single_byte_flips() {
        let data = b"%PDF-1.5 signed payload".to_vec();
        let a = hash_bytes(&data);
        let b = hash_bytes(&data);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        for idx in 0..data.len() {
            let mut flipped = data.clone();
            flipped[idx] ^= 0x01;
            assert_ne!(hash_bytes(&flipped), a, "flip at {idx} kept the hash");
        }
    }

    #[test]
    fn verify_reports_unchanged_and_changed_buffers() {
        let original = b"document-bytes".to_vec();
        let expected = hash_bytes(&original);

        let same = verify(&expected, &original);
        assert!(same.is_verified);
        assert!(!same.changed);
        assert_eq!(same.current_hash, expected);

        let mut tampered = original.clone();
        tampered.push(b'!');
        let diff = verify(&expected, &tampered);
        assert!(!diff.is_verified);
        assert!(diff.changed);
        assert_eq!(diff.expected_hash, expected);
        assert_ne!(diff.current_hash, expected);
    }

    #[test]
    fn verify_compares_hashes_exactly() {
        let original = b"document-bytes".to_vec();
        let expected = hash_bytes(&original);

        let upper = verify(&expected.to_ascii_uppercase(), &original);
        assert!(upper.changed);
        assert!(!upper.is_verified);
        assert_eq!(upper.current_hash, expected);

        let padded = verify(&format!(" {expected}"), &original);
        assert!(padded.changed);
        assert!(verify(&expected, &original).is_verified);
    }

    #[test]
    fn hash_reader_matches_hash_bytes_across_chunk_boundaries() {
        let data: Vec<u8> = (0..(READ_CHUNK * 2 + 17)).map(|i| (i % 251) as u8).collect();
        let streamed = hash_reader(std::io::Cursor::new(&data)).expect("read");
        assert_eq!(streamed, hash_bytes(&data));
    }

    #[test]
    fn verify_file_rehashes_stored_bytes() {
        let dir = std::env::temp_dir().join(format!(
            "fieldstamp_integrity_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("mkdir");
        let path = dir.join("signed.pdf");
        let mut f = std::fs::File::create(&path).expect("create");
        f.write_all(b"stored output").expect("write");
        drop(f);

        let expected = hash_bytes(b"stored output");
        let report = verify_file(&expected, &path).expect("verify");
        assert!(report.is_verified);

        std::fs::write(&path, b"stored outpuT").expect("rewrite");
        let report = verify_file(&expected, &path).expect("verify");
        assert!(report.changed);

        assert!(verify_file(&expected, dir.join("missing.pdf")).is_err());
    }

    #[test]
    fn audit_record_fingerprint_is_deterministic() {
        let record = AuditRecord::new("doc-1", AuditAction::Sign, 1_700_000_000_000)
            .with_hashes("aa", Some("bb".to_string()))
            .with_field_count(3);
        let json = record.to_json();
        assert_eq!(json["action"], "sign");
        assert_eq!(json["details"]["fieldCount"], 3);
        assert_eq!(record.fingerprint(), record.clone().fingerprint());

        let other = AuditRecord {
            field_count: Some(4),
            ..record.clone()
        };
        assert_ne!(other.fingerprint(), record.fingerprint());
    }

    #[test]
    fn audit_action_names_round_trip() {
        for action in [
            AuditAction::Upload,
            AuditAction::Sign,
            AuditAction::View,
            AuditAction::Download,
            AuditAction::Modify,
            AuditAction::Email,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("delete"), None);
    }
}
