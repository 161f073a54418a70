//! Child process execution with both output streams drained concurrently.

use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};

use super::classify::Severity;

/// Run `command` to completion, handing every output line to `on_line` on the
/// calling thread.
///
/// Each stream gets its own reader thread so a full pipe on one side can never
/// stall the child while the other is being read. Lines are funnelled through
/// one channel, so `on_line` sees them one at a time: in order within a
/// stream, in arrival order across streams.
pub fn run_streaming<F>(command: &mut Command, mut on_line: F) -> Result<ExitStatus>
where
    F: FnMut(Severity, &str),
{
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("spawning build command")?;

    let stdout = child.stdout.take().context("Failed to capture stdout")?;
    let stderr = child.stderr.take().context("Failed to capture stderr")?;

    let (tx, rx) = mpsc::channel();
    let readers = [
        spawn_reader(stdout, Severity::Debug, tx.clone()),
        spawn_reader(stderr, Severity::Warning, tx),
    ];

    // Ends once both readers hit end-of-stream and drop their senders.
    for (severity, line) in rx {
        on_line(severity, &line);
    }

    if let Err(e) = join_readers(readers) {
        stop(&mut child);
        return Err(e);
    }

    child.wait().context("waiting for build command")
}

/// Kill and reap a child whose output can no longer be read.
fn stop(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn join_readers(readers: impl IntoIterator<Item = JoinHandle<io::Result<()>>>) -> Result<()> {
    let mut failure = None;
    for reader in readers {
        let result = reader
            .join()
            .map_err(|_| anyhow!("output reader thread panicked"))
            .and_then(|r| r.context("reading build output"));
        if let Err(e) = result {
            failure.get_or_insert(e);
        }
    }
    failure.map_or(Ok(()), Err)
}

fn spawn_reader<R>(
    stream: R,
    severity: Severity,
    tx: Sender<(Severity, String)>,
) -> JoinHandle<io::Result<()>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches('\n').trim_end_matches('\r');
            // Keep draining even if nobody listens any more.
            let _ = tx.send((severity, line.to_string()));
        }
    })
}
