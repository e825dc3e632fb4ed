// Raspberry Pi camera through the rpicam-apps MJPEG encoder
//
// Runs `rpicam-vid --codec mjpeg -o -` and reads JPEG frames from its stdout.
// Changing the exposure profile restarts the process with new arguments.

use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use super::{CameraError, CameraMode, CameraSettings, FrameSource, JpegSplitter};

const READ_CHUNK: usize = 64 * 1024;

impl CameraMode {
    /// Extra rpicam options for this profile
    fn rpicam_args(self) -> &'static [&'static str] {
        match self {
            CameraMode::Auto => &[],
            CameraMode::Day => &[
                "--awb", "daylight", "--shutter", "8000", "--gain", "1.2", "--awbgains", "0.9,1.2",
            ],
            CameraMode::Night => &["--shutter", "30000", "--gain", "4.0", "--awbgains", "1.8,0.8"],
        }
    }
}

struct Capture {
    // Held so the process is killed when the capture is dropped
    _child: Child,
    stdout: ChildStdout,
}

pub struct RpiCamera {
    settings: CameraSettings,
    capture: Option<Capture>,
    splitter: JpegSplitter,
}

impl RpiCamera {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            capture: None,
            splitter: JpegSplitter::new(),
        }
    }

    pub fn mode(&self) -> CameraMode {
        self.settings.mode
    }

    fn args(&self) -> Vec<String> {
        let s = &self.settings;
        let mut args: Vec<String> = [
            "--timeout",
            "0",
            "--nopreview",
            "--codec",
            "mjpeg",
            "--output",
            "-",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        args.extend([
            "--width".to_string(),
            s.width.to_string(),
            "--height".to_string(),
            s.height.to_string(),
            "--framerate".to_string(),
            s.framerate.to_string(),
        ]);
        args.extend(s.mode.rpicam_args().iter().map(|a| a.to_string()));
        args
    }

    /// Start capturing, replacing any running capture
    pub fn start(&mut self) -> Result<(), CameraError> {
        self.capture = None;
        self.splitter = JpegSplitter::new();

        let args = self.args();
        info!("Starting camera: {} {}", self.settings.command, args.join(" "));

        let mut child = Command::new(&self.settings.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CameraError::Spawn {
                command: self.settings.command.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CameraError::Io(std::io::Error::other("camera stdout was not captured"))
        })?;

        self.capture = Some(Capture {
            _child: child,
            stdout,
        });
        Ok(())
    }
}

#[async_trait]
impl FrameSource for RpiCamera {
    async fn next_frame(&mut self) -> Result<Bytes, CameraError> {
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            if let Some(frame) = self.splitter.next_frame() {
                return Ok(frame);
            }

            if self.capture.is_none() {
                warn!("Camera not running, restarting");
                self.start()?;
            }
            let Some(capture) = self.capture.as_mut() else {
                return Err(CameraError::StreamEnded);
            };

            let n = capture.stdout.read(&mut chunk).await?;
            if n == 0 {
                self.capture = None;
                return Err(CameraError::StreamEnded);
            }
            debug!("camera read {} bytes", n);
            self.splitter.push(&chunk[..n]);
        }
    }

    async fn set_mode(&mut self, mode: CameraMode) -> Result<(), CameraError> {
        info!("Camera mode {:?} -> {:?}", self.settings.mode, mode);
        self.settings.mode = mode;
        self.start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(mode: CameraMode) -> CameraSettings {
        CameraSettings {
            command: "rpicam-vid".to_string(),
            width: 640,
            height: 480,
            framerate: 30,
            mode,
        }
    }

    #[test]
    fn test_args_for_auto_mode() {
        let args = RpiCamera::new(settings(CameraMode::Auto)).args();
        assert_eq!(
            args,
            [
                "--timeout", "0", "--nopreview", "--codec", "mjpeg", "--output", "-", "--width",
                "640", "--height", "480", "--framerate", "30",
            ]
        );
    }

    #[test]
    fn test_args_for_night_mode() {
        let args = RpiCamera::new(settings(CameraMode::Night)).args();
        let tail = &args[args.len() - 6..];
        assert_eq!(tail, ["--shutter", "30000", "--gain", "4.0", "--awbgains", "1.8,0.8"]);
    }

    #[tokio::test]
    async fn test_missing_tool_fails_to_start() {
        let mut camera = RpiCamera::new(CameraSettings {
            command: "/nonexistent/rpicam-vid".to_string(),
            ..settings(CameraMode::Auto)
        });
        assert!(matches!(camera.start(), Err(CameraError::Spawn { .. })));
        assert!(matches!(
            camera.set_mode(CameraMode::Day).await,
            Err(CameraError::Spawn { .. })
        ));
        assert_eq!(camera.mode(), CameraMode::Day);
    }

    #[tokio::test]
    async fn test_restarts_after_process_exits() {
        use std::os::unix::fs::PermissionsExt;

        // Stand-in camera tool: ignores its arguments, prints one frame, exits
        let script = std::env::temp_dir().join(format!("rover-fake-cam-{}.sh", std::process::id()));
        std::fs::write(&script, "#!/bin/sh\nprintf '\\377\\330\\003\\377\\331'\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut camera = RpiCamera::new(CameraSettings {
            command: script.to_string_lossy().into_owned(),
            ..settings(CameraMode::Auto)
        });
        let frame = [0xFF, 0xD8, 0x03, 0xFF, 0xD9];

        // Not started yet: the first request spawns the tool
        assert_eq!(camera.next_frame().await.unwrap(), frame.as_slice());
        assert!(matches!(
            camera.next_frame().await,
            Err(CameraError::StreamEnded)
        ));
        assert!(camera.capture.is_none());

        // The next request after EOF starts a fresh process
        assert_eq!(camera.next_frame().await.unwrap(), frame.as_slice());

        std::fs::remove_file(&script).unwrap();
    }

    #[tokio::test]
    async fn test_frames_from_process_output() {
        // `printf` stands in for the camera: two frames, then EOF
        let mut camera = RpiCamera::new(settings(CameraMode::Auto));
        let mut child = Command::new("printf")
            .arg(r"\377\330\001\377\331\377\330\002\377\331")
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        camera.capture = Some(Capture {
            _child: child,
            stdout,
        });

        assert_eq!(
            camera.next_frame().await.unwrap(),
            [0xFF, 0xD8, 0x01, 0xFF, 0xD9].as_slice()
        );
        assert_eq!(
            camera.next_frame().await.unwrap(),
            [0xFF, 0xD8, 0x02, 0xFF, 0xD9].as_slice()
        );
    }
}
