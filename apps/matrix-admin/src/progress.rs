//! Terminal rendering of upload events.

use std::io::Write;
use std::time::Duration;

use matrix_manager::UploadEvent;
use matrix_transfer::SpeedCalculator;
use tokio::sync::mpsc;

fn human_bytes(bytes: f64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// One progress line, e.g. `42.0% 1.0 MiB/2.4 MiB 512.0 KiB/s eta 3s`.
pub fn progress_line(offset: u64, total: u64, bytes_per_sec: f64, eta: Option<Duration>) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        offset as f64 * 100.0 / total as f64
    };
    let mut line = format!(
        "{percent:.1}% {}/{}",
        human_bytes(offset as f64),
        human_bytes(total as f64)
    );
    if bytes_per_sec > 0.0 {
        line.push_str(&format!(" {}/s", human_bytes(bytes_per_sec)));
    }
    if let Some(eta) = eta {
        line.push_str(&format!(" eta {}s", eta.as_secs()));
    }
    line
}

/// Prints events until the uploader drops its sender.
pub async fn report<W: Write>(mut events: mpsc::Receiver<UploadEvent>, mut out: W) {
    let mut speed = SpeedCalculator::default();
    let mut last_offset = 0;

    while let Some(event) = events.recv().await {
        let line = match event {
            UploadEvent::ArchiveBuilt { files, size } => {
                format!("archived {files} files ({})\n", human_bytes(size as f64))
            }
            UploadEvent::Resumed { upload_id, offset } => {
                last_offset = offset;
                format!("resuming upload {upload_id} at {}\n", human_bytes(offset as f64))
            }
            UploadEvent::Acknowledged { offset, total } => {
                speed.add_sample(offset.saturating_sub(last_offset));
                last_offset = offset;
                let eta = speed.eta(total.saturating_sub(offset));
                format!("\r{}", progress_line(offset, total, speed.bytes_per_second(), eta))
            }
            UploadEvent::Retrying { offset, attempt } => {
                last_offset = offset;
                format!("\nserver is behind, resending from {offset} (attempt {attempt})\n")
            }
            UploadEvent::Completed { upload_id, md5 } => {
                format!("\nupload {upload_id} complete (md5 {md5})\n")
            }
        };
        let _ = out.write_all(line.as_bytes());
        let _ = out.flush();
    }
}
