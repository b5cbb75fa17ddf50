use std::{ffi::OsString, path::PathBuf};

use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum StdIo {
    #[default]
    Null,
    Piped,
    Inherit,
}

impl StdIo {
    fn into_exec(self) -> std::process::Stdio {
        match self {
            StdIo::Null => std::process::Stdio::null(),
            StdIo::Piped => std::process::Stdio::piped(),
            StdIo::Inherit => std::process::Stdio::inherit(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FFMpegBinary {
    path: Option<PathBuf>,
}

impl From<Option<PathBuf>> for FFMpegBinary {
    fn from(path: Option<PathBuf>) -> Self {
        FFMpegBinary { path }
    }
}

impl FFMpegBinary {
    pub fn new<P: Into<PathBuf>>(p: P) -> FFMpegBinary {
        FFMpegBinary {
            path: Some(p.into()),
        }
    }

    pub fn executable_path(&self) -> &std::path::Path {
        if let Some(p) = &self.path {
            p.as_path()
        } else {
            std::path::Path::new("ffmpeg")
        }
    }

    pub(crate) fn build_command<I, S>(&self, args: I) -> FFmpegCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        FFmpegCommand {
            bin: self.clone(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: StdIo::Null,
            stdout: StdIo::Piped,
            stderr: if cfg!(feature = "ffmpeg-debug") {
                StdIo::Inherit
            } else {
                StdIo::Piped
            },
        }
    }
}

/// Low level interface over calling ffmpeg
#[derive(Debug)]
pub(crate) struct FFmpegCommand {
    pub(crate) bin: FFMpegBinary,
    pub(crate) args: Vec<OsString>,
    pub(crate) stdin: StdIo,
    pub(crate) stdout: StdIo,
    pub(crate) stderr: StdIo,
}

impl FFmpegCommand {
    /// The child is killed if the returned handle is dropped before it exits.
    pub(crate) fn spawn(self) -> Result<tokio::process::Child, std::io::Error> {
        log::trace!("spawn {:?}", &self);
        let mut st = Command::new(self.bin.executable_path());
        st.args(self.args)
            .stdin(self.stdin.into_exec())
            .stdout(self.stdout.into_exec())
            .stderr(self.stderr.into_exec())
            .kill_on_drop(true);
        st.spawn()
    }
}
