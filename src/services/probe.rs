use crate::services::error::MediaError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;

/// Geometry and duration reported by an external identification tool.
#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    pub width: i64,
    pub height: i64,
    /// Seconds; zero for still images.
    pub duration: i64,
    pub mimetype: Option<String>,
    pub raw: Value,
}

/// Boundary to the external metadata tools: an image-metadata tool and a
/// video prober, both invoked as subprocesses over a local file or URL with
/// a bounded timeout.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn image_metadata(&self, location: &str) -> Result<ProbeResult, MediaError>;
    async fn video_metadata(&self, location: &str) -> Result<ProbeResult, MediaError>;
}

/// Production prober driving the configured `identify`-style and
/// `ffprobe`-style executables. A run past the timeout is killed and
/// surfaces as [`MediaError::Timeout`].
pub struct ToolProber {
    identify_path: String,
    ffprobe_path: String,
    timeout: Duration,
}

impl ToolProber {
    pub fn new(identify_path: String, ffprobe_path: String, timeout: Duration) -> Self {
        Self {
            identify_path,
            ffprobe_path,
            timeout,
        }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<Value, MediaError> {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| MediaError::Timeout(self.timeout, format!("{program} {args:?}")))?
            .map_err(|e| MediaError::Identification(format!("cannot run {program}: {e}")))?;

        if !output.status.success() {
            return Err(MediaError::Identification(format!(
                "{program} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        serde_json::from_slice(&output.stdout).map_err(|e| {
            MediaError::Identification(format!("cannot parse {program} output: {e}"))
        })
    }
}

#[async_trait]
impl MediaProber for ToolProber {
    /// Runs the image-metadata tool (`magick convert <src> json:-` shape) and
    /// extracts geometry plus the reported mimetype.
    async fn image_metadata(&self, location: &str) -> Result<ProbeResult, MediaError> {
        let raw = self.run(&self.identify_path, &[location, "json:-"]).await?;

        // The tool reports either a single object or a one-element list.
        let entry = match &raw {
            Value::Array(items) => items.first().ok_or_else(|| {
                MediaError::Identification("empty image-metadata result".into())
            })?,
            other => other,
        };
        let image = entry
            .get("image")
            .ok_or_else(|| MediaError::Identification("no image field in metadata".into()))?;

        let geometry = image.get("geometry");
        let width = geometry
            .and_then(|g| g.get("width"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let height = geometry
            .and_then(|g| g.get("height"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let mimetype = image
            .get("mimeType")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(ProbeResult {
            width,
            height,
            duration: 0,
            mimetype,
            raw,
        })
    }

    /// Runs the video prober and extracts duration from the container format
    /// plus width/height from the first dimensioned stream.
    async fn video_metadata(&self, location: &str) -> Result<ProbeResult, MediaError> {
        let raw = self
            .run(
                &self.ffprobe_path,
                &[
                    "-i",
                    location,
                    "-v",
                    "quiet",
                    "-print_format",
                    "json",
                    "-show_format",
                    "-show_streams",
                    "-show_error",
                ],
            )
            .await?;

        let duration = raw
            .get("format")
            .and_then(|f| f.get("duration"))
            .and_then(Value::as_str)
            .and_then(|d| d.parse::<f64>().ok())
            .map(|secs| secs.round() as i64)
            .unwrap_or(0);

        let mut width = 0;
        let mut height = 0;
        if let Some(streams) = raw.get("streams").and_then(Value::as_array) {
            for stream in streams {
                let w = stream.get("width").and_then(Value::as_i64).unwrap_or(0);
                let h = stream.get("height").and_then(Value::as_i64).unwrap_or(0);
                if w > 0 || h > 0 {
                    width = w;
                    height = h;
                }
            }
        }

        Ok(ProbeResult {
            width,
            height,
            duration,
            mimetype: None,
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_kills_slow_tool() {
        let prober = ToolProber::new(
            "sleep".to_string(),
            "sleep".to_string(),
            Duration::from_millis(50),
        );
        let err = prober.run("sleep", &["5"]).await.unwrap_err();
        assert!(matches!(err, MediaError::Timeout(_, _)));
    }

    #[tokio::test]
    async fn test_missing_tool_is_identification_error() {
        let prober = ToolProber::new(
            "definitely-not-a-real-binary".to_string(),
            "ffprobe".to_string(),
            Duration::from_secs(1),
        );
        let err = prober
            .image_metadata("/tmp/whatever.png")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Identification(_)));
    }
}
