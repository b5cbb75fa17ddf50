//! Invoking the external transcoder.
//!
//! Everything above this module talks to a [`Transcoder`], which takes an
//! argument vector and hands back whatever the process wrote to stdout.
use async_trait::async_trait;

mod cmd;

pub use cmd::FFMpegBinary;

#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("ffmpeg exited with {code}: {stderr}")]
    Exit { code: i32, stderr: String },
    #[error("ffmpeg was terminated by a signal: {stderr}")]
    Killed { stderr: String },
    #[error("ffmpeg did not finish within {0:?}")]
    Timeout(std::time::Duration),
}

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run once with `args`, returning the bytes written to stdout.
    async fn transcode(&self, args: Vec<String>) -> Result<Vec<u8>, TranscodeError>;
}

#[derive(Debug, Clone, Default)]
pub struct FFmpegTranscoder {
    bin: FFMpegBinary,
}

impl FFmpegTranscoder {
    pub fn new(bin: FFMpegBinary) -> FFmpegTranscoder {
        FFmpegTranscoder { bin }
    }
}

#[async_trait]
impl Transcoder for FFmpegTranscoder {
    async fn transcode(&self, args: Vec<String>) -> Result<Vec<u8>, TranscodeError> {
        let child = self.bin.build_command(args).spawn()?;
        let output = child.wait_with_output().await?;
        log::trace!(
            "ffmpeg complete: {:?}, {} bytes",
            output.status,
            output.stdout.len()
        );
        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        match output.status.code() {
            Some(code) => Err(TranscodeError::Exit { code, stderr }),
            None => Err(TranscodeError::Killed { stderr }),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exit_error_carries_stderr() {
        let err = TranscodeError::Exit {
            code: 1,
            stderr: "No such file or directory".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "ffmpeg exited with 1: No such file or directory"
        );
    }

    #[tokio::test]
    async fn missing_binary_is_io_error() {
        let transcoder = FFmpegTranscoder::new(FFMpegBinary::new("/nonexistent/ffmpeg-binary"));
        let err = transcoder
            .transcode(vec!["-version".to_owned()])
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Io(_)));
    }
}
