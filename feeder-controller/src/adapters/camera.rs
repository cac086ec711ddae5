use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use feeder_core::{Resolution, Rotation};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::ports::Camera;

/// How long `rpicam-vid` gets to finalize the file after SIGINT.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Still capture warm-up, in milliseconds.
const STILL_TIMEOUT_MS: &str = "1000";

/// Camera driven through the `rpicam-still` and `rpicam-vid` programs.
pub struct RpicamCamera {
    still_program: String,
    video_program: String,
    recording: Mutex<Option<Recording>>,
}

struct Recording {
    child: Child,
    path: PathBuf,
}

impl RpicamCamera {
    pub fn new(still_program: impl Into<String>, video_program: impl Into<String>) -> Self {
        Self {
            still_program: still_program.into(),
            video_program: video_program.into(),
            recording: Mutex::new(None),
        }
    }
}

/// The sensor pipeline only flips; quarter turns are rejected.
fn rotation_arg(rotation: Rotation) -> Result<String, CaptureError> {
    match rotation {
        Rotation::None | Rotation::Half => Ok(rotation.degrees().to_string()),
        other => Err(CaptureError::UnsupportedRotation(other.degrees())),
    }
}

fn common_args(path: &Path, resolution: Resolution, rotation: Rotation) -> Result<Vec<String>, CaptureError> {
    Ok(vec![
        "--nopreview".to_string(),
        "--width".to_string(),
        resolution.width.to_string(),
        "--height".to_string(),
        resolution.height.to_string(),
        "--rotation".to_string(),
        rotation_arg(rotation)?,
        "--output".to_string(),
        path.display().to_string(),
    ])
}

async fn ensure_written(path: &Path) -> Result<(), CaptureError> {
    if tokio::fs::try_exists(path).await? {
        Ok(())
    } else {
        Err(CaptureError::MissingOutput(path.to_path_buf()))
    }
}

#[async_trait]
impl Camera for RpicamCamera {
    async fn capture_photo(
        &self,
        path: &Path,
        resolution: Resolution,
        rotation: Rotation,
    ) -> Result<(), CaptureError> {
        let args = common_args(path, resolution, rotation)?;
        debug!(program = %self.still_program, ?args, "Running still capture");

        let output = Command::new(&self.still_program)
            .args(&args)
            .args(["--timeout", STILL_TIMEOUT_MS])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CaptureError::Spawn {
                program: self.still_program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CaptureError::Failed {
                program: self.still_program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        ensure_written(path).await
    }

    async fn start_video(
        &self,
        path: &Path,
        resolution: Resolution,
        rotation: Rotation,
    ) -> Result<(), CaptureError> {
        let mut recording = self.recording.lock().await;
        if recording.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let args = common_args(path, resolution, rotation)?;
        debug!(program = %self.video_program, ?args, "Starting video capture");

        let child = Command::new(&self.video_program)
            .args(&args)
            .args(["--timeout", "0", "--codec", "h264"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                program: self.video_program.clone(),
                source,
            })?;

        *recording = Some(Recording {
            child,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    async fn wait_video(&self, duration: Duration) -> Result<(), CaptureError> {
        tokio::time::sleep(duration).await;

        let mut recording = self.recording.lock().await;
        let recording = recording.as_mut().ok_or(CaptureError::NotRecording)?;
        match recording.child.try_wait()? {
            None => Ok(()),
            Some(status) => Err(CaptureError::Failed {
                program: self.video_program.clone(),
                status: status.to_string(),
                stderr: "exited before the recording was stopped".to_string(),
            }),
        }
    }

    async fn stop_video(&self) -> Result<PathBuf, CaptureError> {
        let Recording { mut child, path } = self
            .recording
            .lock()
            .await
            .take()
            .ok_or(CaptureError::NotRecording)?;

        if child.try_wait()?.is_none() {
            if let Some(pid) = child.id() {
                interrupt(pid);
            }
            match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                Ok(status) => {
                    let status = status?;
                    debug!(%status, "Video capture exited");
                }
                Err(_) => {
                    warn!("Video capture ignored SIGINT, killing it");
                    child.kill().await?;
                }
            }
        }

        ensure_written(&path).await?;
        info!(path = ?path, "Video capture stopped");
        Ok(path)
    }
}

/// Ask the recorder to finish its file the way Ctrl+C would.
fn interrupt(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "Process id out of range, not signalling");
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGINT) {
        warn!(pid, error = %e, "Failed to send SIGINT");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_capture_arguments() {
        let args = common_args(
            Path::new("/tmp/image_1.jpg"),
            Resolution::new(2592, 1944),
            Rotation::Half,
        )
        .unwrap();
        assert_eq!(
            args,
            [
                "--nopreview",
                "--width",
                "2592",
                "--height",
                "1944",
                "--rotation",
                "180",
                "--output",
                "/tmp/image_1.jpg"
            ]
        );
    }

    #[test]
    fn quarter_turns_are_unsupported() {
        assert!(matches!(
            rotation_arg(Rotation::Quarter),
            Err(CaptureError::UnsupportedRotation(90))
        ));
        assert_eq!(rotation_arg(Rotation::None).unwrap(), "0");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let camera = RpicamCamera::new("/nonexistent/rpicam-still", "/nonexistent/rpicam-vid");

        let result = camera
            .capture_photo(
                &dir.path().join("image.jpg"),
                Resolution::new(640, 480),
                Rotation::None,
            )
            .await;
        assert!(matches!(result, Err(CaptureError::Spawn { .. })));
    }

    #[tokio::test]
    async fn stop_without_start_is_an_error() {
        let camera = RpicamCamera::new("rpicam-still", "rpicam-vid");
        assert!(matches!(
            camera.stop_video().await,
            Err(CaptureError::NotRecording)
        ));
    }

    #[tokio::test]
    async fn interrupt_stops_the_process() {
        use std::os::unix::process::ExitStatusExt;

        let mut child = Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();

        interrupt(child.id().unwrap());

        let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("sleep should exit on SIGINT")
            .unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGINT as i32));
    }

    #[tokio::test]
    async fn stop_video_interrupts_recorder_and_keeps_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = dir.path().join("fake-vid");
        // finishes the output file only when interrupted
        std::fs::write(
            &recorder,
            "#!/bin/sh\n\
             while [ \"$1\" != --output ]; do shift; done\n\
             out=\"$2\"\n\
             trap 'printf h264 > \"$out\"; exit 0' INT\n\
             while :; do sleep 0.05; done\n",
        )
        .unwrap();
        let mut perms = std::fs::metadata(&recorder).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&recorder, perms).unwrap();

        let camera = RpicamCamera::new("rpicam-still", recorder.display().to_string());
        let path = dir.path().join("video_1.h264");
        camera
            .start_video(&path, Resolution::new(640, 480), Rotation::None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stopped = tokio::time::timeout(STOP_GRACE, camera.stop_video())
            .await
            .expect("recorder should exit on SIGINT before the grace period")
            .unwrap();

        assert_eq!(stopped, path);
        assert_eq!(std::fs::read(&path).unwrap(), b"h264");
    }
}
