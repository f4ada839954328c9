/// Key layout and encoding utilities for the state keyspace
///
/// Partition structure:
/// - `cursors`: state:{source} -> CollectionSnapshot (JSON)
/// - `artifacts`: artifact:{source}:{path} -> ArtifactRecord (JSON)
/// - `metadata`: meta:{key} -> value (string)

/// Encode a cursor key: state:{source}
pub fn encode_state_key(source: &str) -> Vec<u8> {
    format!("state:{}", source).into_bytes()
}

/// Decode a cursor key: state:{source} -> source
pub fn decode_state_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("state:").map(String::from)
}

/// Encode an artifact key: artifact:{source}:{path}
pub fn encode_artifact_key(source: &str, path: &str) -> Vec<u8> {
    format!("artifact:{}:{}", source, path).into_bytes()
}

/// Encode an artifact prefix for range scan: artifact:{source}:
pub fn encode_artifact_prefix(source: &str) -> Vec<u8> {
    format!("artifact:{}:", source).into_bytes()
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}

/// Metadata key holding the last successful run time of a source
pub fn last_run_meta(source: &str) -> String {
    format!("last_run:{}", source)
}
