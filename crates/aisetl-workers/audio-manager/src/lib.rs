//! Audio manager worker: fans a manifest out into per-record ETL calls and
//! assembles the results into a tar archive.
//!
//! The payload is a newline-delimited text manifest; each non-empty line is a
//! JSON object with at least `id`, `part`, `from_time`, and `to_time`. For
//! every valid record the manager reads
//! `{prefix}{id}.{extension}` from the source bucket through the nested ETL
//! (passing the whole record as its `etl_args`) and appends the returned
//! bytes as tar member `{id}_{part}.wav`, in manifest order. Lines that do
//! not parse and records that fail are logged and skipped; they never abort
//! the batch. Duplicate `(id, part)` pairs are permitted and yield duplicate
//! member names.
//!
//! Settings come from the class-payload `config` object with environment
//! fallback: `src_bucket`/`SRC_BUCKET` (required), `src_provider` (default
//! `ais`), `obj_prefix` (default empty), `obj_extension` (default `wav`),
//! `etl_name`/`ETL_NAME` (required), `direct_from_target` (default true).

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use linkme::distributed_slice;
use tracing::{debug, error, info, warn};

use aisetl_core::{
    Bucket, BuildContext, BuildError, ClientResult, EtlCall, ObjectClient, TRANSFORMS, Transform,
    TransformError, TransformResult, TransformSpec,
};

/// One validated manifest line.
#[derive(Debug, Clone)]
struct ManifestRecord {
    id: String,
    part: serde_json::Number,
    raw: serde_json::Value,
}

impl ManifestRecord {
    const REQUIRED: [&'static str; 4] = ["id", "part", "from_time", "to_time"];

    /// Parses and validates one line; `None` means warn-and-skip.
    fn parse(line: &str, line_no: usize) -> Option<Self> {
        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping unparseable manifest line");
                return None;
            }
        };
        for field in Self::REQUIRED {
            if value.get(field).is_none() {
                warn!(line = line_no, field, "Skipping manifest line with missing field");
                return None;
            }
        }
        let Some(id) = value["id"].as_str().map(str::to_string) else {
            warn!(line = line_no, "Skipping manifest line: id is not a string");
            return None;
        };
        let Some(part) = value["part"].as_number().cloned() else {
            warn!(line = line_no, "Skipping manifest line: part is not a number");
            return None;
        };
        Some(Self {
            id,
            part,
            raw: value,
        })
    }

    fn member_name(&self) -> String {
        format!("{}_{}.wav", self.id, self.part)
    }
}

/// The manifest fan-out transform.
pub struct AudioManager {
    client: Arc<dyn ObjectClient>,
    bucket: Bucket,
    prefix: String,
    extension: String,
    etl_name: String,
    direct: bool,
}

impl AudioManager {
    /// Creates a manager that fans out through `client`.
    pub fn new(
        client: Arc<dyn ObjectClient>,
        bucket: Bucket,
        etl_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            bucket,
            prefix: String::new(),
            extension: "wav".to_string(),
            etl_name: etl_name.into(),
            direct: true,
        }
    }

    /// Sets the object-key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the object-key extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Enables or disables direct delivery from the serving target.
    pub fn direct_from_target(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    /// Runs the nested ETL for one record.
    async fn fetch_segment(&self, record: &ManifestRecord) -> ClientResult<Bytes> {
        let key = format!("{}{}.{}", self.prefix, record.id, self.extension);
        let args = urlencoding::encode(&record.raw.to_string()).into_owned();
        debug!(etl = %self.etl_name, key = %key, "Requesting nested ETL");
        let call = EtlCall::new(&self.etl_name)
            .with_args(args)
            .direct(self.direct);
        self.client.get_object(&self.bucket, &key, Some(&call)).await
    }
}

#[async_trait]
impl Transform for AudioManager {
    fn content_type(&self) -> &str {
        "application/x-tar"
    }

    async fn transform(
        &self,
        payload: Bytes,
        _path: &str,
        _etl_args: &str,
    ) -> TransformResult<Bytes> {
        let manifest = std::str::from_utf8(&payload)
            .map_err(|e| TransformError::failed(format!("manifest is not valid UTF-8: {e}")))?;

        let mut archive = tar::Builder::new(Vec::new());
        let mut members = 0usize;

        for (idx, raw_line) in manifest.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(record) = ManifestRecord::parse(line, line_no) else {
                continue;
            };
            match self.fetch_segment(&record).await {
                Ok(segment) => {
                    let mut header = tar::Header::new_gnu();
                    header.set_size(segment.len() as u64);
                    header.set_mode(0o644);
                    header.set_cksum();
                    archive
                        .append_data(&mut header, record.member_name(), &segment[..])
                        .map_err(|e| TransformError::failed(e.to_string()))?;
                    members += 1;
                }
                Err(e) => {
                    error!(line = line_no, error = %e, "Manifest record failed");
                }
            }
        }

        let data = archive
            .into_inner()
            .map_err(|e| TransformError::failed(e.to_string()))?;
        info!(members, "Assembled tar archive");
        Ok(Bytes::from(data))
    }
}

fn setting(ctx: &BuildContext, key: &str, env: &str) -> Option<String> {
    ctx.config
        .get(key)
        .and_then(|v| v.as_str().map(str::to_string))
        .or_else(|| std::env::var(env).ok())
}

fn build(ctx: &BuildContext) -> Result<Arc<dyn Transform>, BuildError> {
    let bucket_name = setting(ctx, "src_bucket", "SRC_BUCKET")
        .ok_or_else(|| BuildError::new("src_bucket (SRC_BUCKET) is required"))?;
    let etl_name = setting(ctx, "etl_name", "ETL_NAME")
        .ok_or_else(|| BuildError::new("etl_name (ETL_NAME) is required"))?;
    let provider =
        setting(ctx, "src_provider", "SRC_PROVIDER").unwrap_or_else(|| "ais".to_string());
    let direct = setting(ctx, "direct_from_target", "DIRECT_FROM_TARGET")
        .map(|raw| matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(true);

    let mut manager = AudioManager::new(
        Arc::clone(&ctx.client),
        Bucket::ais(bucket_name).with_provider(provider),
        etl_name,
    )
    .direct_from_target(direct);
    if let Some(prefix) = setting(ctx, "obj_prefix", "OBJ_PREFIX") {
        manager = manager.with_prefix(prefix);
    }
    if let Some(extension) = setting(ctx, "obj_extension", "OBJ_EXTENSION") {
        manager = manager.with_extension(extension);
    }
    Ok(Arc::new(manager))
}

#[distributed_slice(TRANSFORMS)]
static AUDIO_MANAGER: TransformSpec = TransformSpec {
    kind: "audio-manager",
    build,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::Mutex;

    use aisetl_core::ClientError;

    /// Records every call and serves `{id}` bytes for key `{id}.wav`.
    struct MockClient {
        calls: Mutex<Vec<(String, Option<EtlCall>)>>,
        fail_keys: Vec<String>,
    }

    impl MockClient {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_keys: Vec::new(),
            }
        }

        fn failing_on(key: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_keys: vec![key.to_string()],
            }
        }
    }

    #[async_trait]
    impl ObjectClient for MockClient {
        async fn get_object(
            &self,
            _bucket: &Bucket,
            key: &str,
            etl: Option<&EtlCall>,
        ) -> ClientResult<Bytes> {
            self.calls
                .lock()
                .unwrap()
                .push((key.to_string(), etl.cloned()));
            if self.fail_keys.iter().any(|k| k == key) {
                return Err(ClientError::Status {
                    url: key.to_string(),
                    status: 500,
                    body: "simulated".to_string(),
                });
            }
            Ok(Bytes::from(format!("segment:{key}")))
        }

        async fn put_content(
            &self,
            _bucket: &Bucket,
            _key: &str,
            _body: Bytes,
        ) -> ClientResult<()> {
            Ok(())
        }
    }

    fn manager(client: Arc<MockClient>) -> AudioManager {
        AudioManager::new(client, Bucket::ais("speech"), "audio-splitter")
    }

    fn tar_members(data: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = tar::Archive::new(std::io::Cursor::new(data));
        archive
            .entries()
            .unwrap()
            .map(|entry| {
                let mut entry = entry.unwrap();
                let name = entry.path().unwrap().display().to_string();
                let mut body = Vec::new();
                entry.read_to_end(&mut body).unwrap();
                (name, body)
            })
            .collect()
    }

    const MANIFEST: &str = concat!(
        "{\"id\":\"a\",\"part\":0,\"from_time\":0,\"to_time\":1}\n",
        "{\"id\":\"a\",\"part\":1,\"from_time\":1,\"to_time\":2}\n",
        "{\"id\":\"a\",\"part\":2,\"from_time\":2,\"to_time\":3}\n",
    );

    #[tokio::test]
    async fn test_manifest_to_tar_in_order() {
        let client = Arc::new(MockClient::new());
        let out = manager(Arc::clone(&client))
            .transform(Bytes::from_static(MANIFEST.as_bytes()), "manifest", "")
            .await
            .unwrap();

        let members = tar_members(&out);
        let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a_0.wav", "a_1.wav", "a_2.wav"]);
        for (_, body) in &members {
            assert_eq!(body, b"segment:a.wav");
        }
    }

    #[tokio::test]
    async fn test_nested_etl_call_carries_record_args() {
        let client = Arc::new(MockClient::new());
        manager(Arc::clone(&client))
            .transform(
                Bytes::from_static(b"{\"id\":\"a\",\"part\":0,\"from_time\":0.5,\"to_time\":1}\n"),
                "manifest",
                "",
            )
            .await
            .unwrap();

        let calls = client.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (key, etl) = &calls[0];
        assert_eq!(key, "a.wav");
        let etl = etl.as_ref().unwrap();
        assert_eq!(etl.name, "audio-splitter");
        assert!(etl.direct);
        let decoded = urlencoding::decode(etl.args.as_ref().unwrap()).unwrap();
        let record: serde_json::Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(record["from_time"], 0.5);
        assert_eq!(record["id"], "a");
    }

    #[tokio::test]
    async fn test_invalid_lines_are_skipped() {
        let manifest = concat!(
            "not json at all\n",
            "{\"id\":\"a\",\"from_time\":0,\"to_time\":1}\n",
            "\n",
            "{\"id\":\"b\",\"part\":3,\"from_time\":0,\"to_time\":1}\n",
        );
        let client = Arc::new(MockClient::new());
        let out = manager(Arc::clone(&client))
            .transform(Bytes::from_static(manifest.as_bytes()), "manifest", "")
            .await
            .unwrap();

        let members = tar_members(&out);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].0, "b_3.wav");
    }

    #[tokio::test]
    async fn test_failing_record_does_not_abort_batch() {
        let manifest = concat!(
            "{\"id\":\"bad\",\"part\":0,\"from_time\":0,\"to_time\":1}\n",
            "{\"id\":\"good\",\"part\":0,\"from_time\":0,\"to_time\":1}\n",
        );
        let client = Arc::new(MockClient::failing_on("bad.wav"));
        let out = manager(Arc::clone(&client))
            .transform(Bytes::from_static(manifest.as_bytes()), "manifest", "")
            .await
            .unwrap();

        let members = tar_members(&out);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].0, "good_0.wav");
    }

    #[tokio::test]
    async fn test_duplicate_records_keep_duplicate_names() {
        let manifest = concat!(
            "{\"id\":\"a\",\"part\":0,\"from_time\":0,\"to_time\":1}\n",
            "{\"id\":\"a\",\"part\":0,\"from_time\":1,\"to_time\":2}\n",
        );
        let client = Arc::new(MockClient::new());
        let out = manager(Arc::clone(&client))
            .transform(Bytes::from_static(manifest.as_bytes()), "manifest", "")
            .await
            .unwrap();

        let names: Vec<String> = tar_members(&out).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a_0.wav", "a_0.wav"]);
    }

    #[tokio::test]
    async fn test_prefix_and_extension_shape_keys() {
        let client = Arc::new(MockClient::new());
        manager(Arc::clone(&client))
            .with_prefix("raw/")
            .with_extension("flac")
            .transform(
                Bytes::from_static(b"{\"id\":\"a\",\"part\":0,\"from_time\":0,\"to_time\":1}\n"),
                "manifest",
                "",
            )
            .await
            .unwrap();
        let calls = client.calls.lock().unwrap();
        assert_eq!(calls[0].0, "raw/a.flac");
    }

    #[test]
    fn test_registered() {
        assert!(aisetl_core::find_transform("audio-manager").is_some());
    }
}
