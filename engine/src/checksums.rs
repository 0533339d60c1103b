//! Checksum and sidecar functionality.
//!
//! This module provides:
//! - Digest algorithms (MD5, SHA-256, BLAKE3)
//! - File-level checksum computation
//! - Detached sidecar records (`<artifact>.<ext>`) and their verification
//!
//! A sidecar holds a single line `"<hex>  <file name>\n"`. The two spaces
//! are what `md5sum -c`, `sha256sum -c` and `b3sum -c` expect, so job
//! scripts can produce sidecars with those tools and this module can check
//! them (and vice versa).

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5 (weak, but what the staging format has always used)
    #[default]
    Md5,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!(
                "unknown checksum algorithm '{}' (expected md5, sha256 or blake3)",
                other
            )),
        }
    }
}

impl ChecksumAlgorithm {
    /// Extension appended to an artifact path to name its sidecar
    pub fn sidecar_extension(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    /// External tool that writes and checks sidecars in the same format
    pub fn tool(&self) -> &'static str {
        match self {
            Self::Md5 => "md5sum",
            Self::Sha256 => "sha256sum",
            Self::Blake3 => "b3sum",
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    /// Create a new checksum value
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    /// Get the algorithm
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Get the hex string representation
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Trait for computing checksums
pub trait ChecksumHasher {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize and return the checksum value
    fn finalize(self: Box<Self>) -> ChecksumValue;
}

/// MD5 hasher (backed by md5 crate)
struct Md5Hasher {
    context: md5::Context,
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.context.compute();
        ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", digest))
    }
}

/// SHA-256 hasher (backed by sha2 crate)
struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl ChecksumHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        use sha2::Digest;
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", digest))
    }
}

/// BLAKE3 hasher (backed by blake3 crate)
struct Blake3Hasher {
    hasher: blake3::Hasher,
}

impl ChecksumHasher for Blake3Hasher {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Blake3, digest.to_hex().to_string())
    }
}

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        ChecksumAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
    }
}

/// Compute checksum for a file
pub fn compute_file_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> Result<ChecksumValue> {
    let mut file = File::open(path).map_err(|e| EngineError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = create_hasher(algorithm);
    let mut buffer = [0u8; 65536]; // 64 KB buffer
    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) => {
                return Err(EngineError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        }
    }

    Ok(hasher.finalize())
}

/// Detached integrity record for one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidecar {
    pub digest: String,
    pub artifact_file_name: String,
}

impl Sidecar {
    /// Parse the single `"<hex>  <name>"` line of a sidecar.
    ///
    /// Also accepts the escaped form coreutils writes for names containing a
    /// backslash or a line break: a leading `\` before the digest, with `\\`,
    /// `\n` and `\r` standing for those characters in the name.
    ///
    /// Returns None unless one of those shapes is found.
    pub fn parse(content: &str) -> Option<Sidecar> {
        let line = content.lines().next()?;
        let (escaped, line) = match line.strip_prefix('\\') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (digest, name) = line.split_once("  ")?;
        if digest.is_empty()
            || name.is_empty()
            || !digest.chars().all(|c| c.is_ascii_hexdigit())
        {
            return None;
        }
        let artifact_file_name = if escaped {
            unescape_name(name)?
        } else {
            name.to_string()
        };
        Some(Sidecar {
            digest: digest.to_string(),
            artifact_file_name,
        })
    }

    /// The sidecar's file content, newline terminated, escaped the way the
    /// digest tools escape it.
    pub fn to_line(&self) -> String {
        if self.artifact_file_name.contains(['\\', '\n', '\r']) {
            let name = self
                .artifact_file_name
                .replace('\\', "\\\\")
                .replace('\n', "\\n")
                .replace('\r', "\\r");
            format!("\\{}  {}\n", self.digest, name)
        } else {
            format!("{}  {}\n", self.digest, self.artifact_file_name)
        }
    }
}

fn unescape_name(name: &str) -> Option<String> {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            _ => return None,
        }
    }
    Some(out)
}

/// Outcome of checking an artifact against its sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidecarStatus {
    Verified,
    MissingArtifact,
    MissingSidecar,
    Malformed,
    /// Sidecar was written for a different file name
    NameMismatch,
    DigestMismatch,
}

impl SidecarStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, SidecarStatus::Verified)
    }
}

impl fmt::Display for SidecarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SidecarStatus::Verified => "verified",
            SidecarStatus::MissingArtifact => "artifact missing",
            SidecarStatus::MissingSidecar => "checksum file missing",
            SidecarStatus::Malformed => "checksum file malformed",
            SidecarStatus::NameMismatch => "checksum file names another artifact",
            SidecarStatus::DigestMismatch => "checksum mismatch",
        };
        f.write_str(text)
    }
}

/// Path of the sidecar that belongs to `artifact`.
pub fn sidecar_path(artifact: &Path, algorithm: ChecksumAlgorithm) -> PathBuf {
    let mut name = artifact.as_os_str().to_os_string();
    name.push(".");
    name.push(algorithm.sidecar_extension());
    PathBuf::from(name)
}

fn artifact_file_name(artifact: &Path) -> Result<String> {
    artifact
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| EngineError::InvalidPath {
            path: artifact.to_path_buf(),
            reason: "artifact has no UTF-8 file name".to_string(),
        })
}

/// Compute the digest of `artifact` and write its sidecar beside it.
pub fn generate_sidecar(artifact: &Path, algorithm: ChecksumAlgorithm) -> Result<Sidecar> {
    let name = artifact_file_name(artifact)?;
    let checksum = compute_file_checksum(artifact, algorithm)?;
    let sidecar = Sidecar {
        digest: checksum.hex().to_string(),
        artifact_file_name: name,
    };

    let path = sidecar_path(artifact, algorithm);
    std::fs::write(&path, sidecar.to_line()).map_err(|e| EngineError::WriteError {
        path: path.clone(),
        source: e,
    })?;
    tracing::debug!(
        artifact = %artifact.display(),
        algorithm = %checksum.algorithm(),
        digest = %sidecar.digest,
        "wrote checksum file"
    );

    Ok(sidecar)
}

/// Recompute the digest of `artifact` and compare it with its sidecar.
///
/// Every negative outcome is a status, never an error.
pub fn check_sidecar(artifact: &Path, algorithm: ChecksumAlgorithm) -> SidecarStatus {
    let content = match std::fs::read_to_string(sidecar_path(artifact, algorithm)) {
        Ok(content) => content,
        Err(_) => return SidecarStatus::MissingSidecar,
    };
    let sidecar = match Sidecar::parse(&content) {
        Some(sidecar) => sidecar,
        None => return SidecarStatus::Malformed,
    };
    match artifact.file_name().and_then(|n| n.to_str()) {
        Some(name) if name == sidecar.artifact_file_name => {}
        _ => return SidecarStatus::NameMismatch,
    }
    if !artifact.is_file() {
        return SidecarStatus::MissingArtifact;
    }
    match compute_file_checksum(artifact, algorithm) {
        Ok(actual) if actual.hex().eq_ignore_ascii_case(&sidecar.digest) => SidecarStatus::Verified,
        Ok(_) => SidecarStatus::DigestMismatch,
        Err(_) => SidecarStatus::MissingArtifact,
    }
}

/// `true` only if the artifact and its sidecar are both present and agree.
pub fn verify_sidecar(artifact: &Path, algorithm: ChecksumAlgorithm) -> bool {
    check_sidecar(artifact, algorithm).is_verified()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn digest_of(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
        let mut hasher = create_hasher(algorithm);
        hasher.update(data);
        hasher.finalize().hex().to_string()
    }

    #[test]
    fn test_algorithm_display() {
        assert_eq!(ChecksumAlgorithm::Md5.to_string(), "md5");
        assert_eq!(ChecksumAlgorithm::Sha256.to_string(), "sha256");
        assert_eq!(ChecksumAlgorithm::Blake3.to_string(), "blake3");
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("md5".parse(), Ok(ChecksumAlgorithm::Md5));
        assert_eq!("SHA256".parse(), Ok(ChecksumAlgorithm::Sha256));
        assert_eq!("blake3".parse(), Ok(ChecksumAlgorithm::Blake3));
        assert!("crc32".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn test_md5_hasher() {
        assert_eq!(
            digest_of(ChecksumAlgorithm::Md5, b"hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn test_sha256_hasher() {
        assert_eq!(
            digest_of(ChecksumAlgorithm::Sha256, b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_blake3_hasher_matches_one_shot() {
        assert_eq!(
            digest_of(ChecksumAlgorithm::Blake3, b"hello"),
            blake3::hash(b"hello").to_hex().to_string()
        );
    }

    #[test]
    fn test_sidecar_line_has_two_spaces() {
        let sidecar = Sidecar {
            digest: "5d41402abc4b2a76b9719d911017c592".to_string(),
            artifact_file_name: "src__a.tar.gz".to_string(),
        };
        assert_eq!(
            sidecar.to_line(),
            "5d41402abc4b2a76b9719d911017c592  src__a.tar.gz\n"
        );
        assert_eq!(Sidecar::parse(&sidecar.to_line()), Some(sidecar));
    }

    #[test]
    fn test_sidecar_parse_rejects_single_space() {
        assert_eq!(Sidecar::parse("5d41402abc4b2a76 src__a.tar.gz\n"), None);
        assert_eq!(Sidecar::parse(""), None);
        assert_eq!(Sidecar::parse("not-hex  file\n"), None);
    }

    #[test]
    fn test_sidecar_parse_escaped_name() {
        // As written by `md5sum 'a\b.tar.gz'`.
        let line = "\\5d41402abc4b2a76b9719d911017c592  a\\\\b.tar.gz\n";
        let sidecar = Sidecar::parse(line).expect("Failed to parse escaped sidecar");
        assert_eq!(sidecar.digest, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(sidecar.artifact_file_name, "a\\b.tar.gz");
        assert_eq!(sidecar.to_line(), line);

        assert_eq!(Sidecar::parse("\\5d41402abc4b2a76  a\\qb\n"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_verify_artifact_with_backslash_in_name() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let artifact = temp_dir.path().join("src__a\\b.tar.gz");
        fs::write(&artifact, b"hello").expect("Failed to write artifact");
        fs::write(
            temp_dir.path().join("src__a\\b.tar.gz.md5"),
            "\\5d41402abc4b2a76b9719d911017c592  src__a\\\\b.tar.gz\n",
        )
        .expect("Failed to write sidecar");

        assert_eq!(check_sidecar(&artifact, ChecksumAlgorithm::Md5), SidecarStatus::Verified);

        fs::remove_file(temp_dir.path().join("src__a\\b.tar.gz.md5")).expect("Failed to remove sidecar");
        generate_sidecar(&artifact, ChecksumAlgorithm::Md5).expect("Failed to generate");
        let on_disk =
            fs::read_to_string(temp_dir.path().join("src__a\\b.tar.gz.md5")).expect("Failed to read sidecar");
        assert!(on_disk.starts_with('\\'), "expected escaped form, got {:?}", on_disk);
        assert!(verify_sidecar(&artifact, ChecksumAlgorithm::Md5));
    }

    #[test]
    fn test_generate_then_verify() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let artifact = temp_dir.path().join("hello.txt");
        fs::write(&artifact, b"hello").expect("Failed to write artifact");

        let sidecar = generate_sidecar(&artifact, ChecksumAlgorithm::Md5).expect("Failed to generate");
        assert_eq!(sidecar.digest, "5d41402abc4b2a76b9719d911017c592");

        let on_disk = fs::read_to_string(temp_dir.path().join("hello.txt.md5")).expect("Failed to read sidecar");
        assert_eq!(on_disk, "5d41402abc4b2a76b9719d911017c592  hello.txt\n");

        assert!(verify_sidecar(&artifact, ChecksumAlgorithm::Md5));
    }

    #[test]
    fn test_verify_detects_modified_artifact() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let artifact = temp_dir.path().join("data.bin");
        fs::write(&artifact, b"original").expect("Failed to write artifact");
        generate_sidecar(&artifact, ChecksumAlgorithm::Sha256).expect("Failed to generate");

        fs::write(&artifact, b"modified").expect("Failed to modify artifact");
        assert_eq!(
            check_sidecar(&artifact, ChecksumAlgorithm::Sha256),
            SidecarStatus::DigestMismatch
        );
        assert!(!verify_sidecar(&artifact, ChecksumAlgorithm::Sha256));
    }

    #[test]
    fn test_verify_missing_files_is_negative_not_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let artifact = temp_dir.path().join("absent.tar.gz");
        assert_eq!(
            check_sidecar(&artifact, ChecksumAlgorithm::Md5),
            SidecarStatus::MissingSidecar
        );

        fs::write(&artifact, b"x").expect("Failed to write artifact");
        generate_sidecar(&artifact, ChecksumAlgorithm::Md5).expect("Failed to generate");
        fs::remove_file(&artifact).expect("Failed to remove artifact");
        assert_eq!(
            check_sidecar(&artifact, ChecksumAlgorithm::Md5),
            SidecarStatus::MissingArtifact
        );
    }

    #[test]
    fn test_verify_rejects_sidecar_for_other_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let artifact = temp_dir.path().join("a.txt");
        fs::write(&artifact, b"hello").expect("Failed to write artifact");
        fs::write(
            temp_dir.path().join("a.txt.md5"),
            "5d41402abc4b2a76b9719d911017c592  b.txt\n",
        )
        .expect("Failed to write sidecar");

        assert_eq!(
            check_sidecar(&artifact, ChecksumAlgorithm::Md5),
            SidecarStatus::NameMismatch
        );
    }

    #[test]
    fn test_sidecar_path_appends_extension() {
        assert_eq!(
            sidecar_path(Path::new("/stage/files/x.tar.gz"), ChecksumAlgorithm::Blake3),
            PathBuf::from("/stage/files/x.tar.gz.blake3")
        );
    }
}
