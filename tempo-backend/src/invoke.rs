#![forbid(unsafe_code)]

use std::io::{self, BufRead};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvokeResult {
    Completed(RawOutput),
    /// The wall-clock limit passed; the child was killed.
    TimedOut,
}

/// Run `cmd` to completion with both pipes fully drained. The child never
/// inherits stdin. When `timeout` elapses first, the child is killed and the
/// partial output discarded.
pub fn run_supervised(mut cmd: Command, timeout: Option<Duration>) -> io::Result<InvokeResult> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn()?;

    // Drain on dedicated threads so a chatty child cannot deadlock against
    // a full pipe while we poll for exit.
    let mut drains = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        drains.push(std::thread::spawn(move || drain(stdout)));
    }
    if let Some(stderr) = child.stderr.take() {
        drains.push(std::thread::spawn(move || drain(stderr)));
    }

    let started = Instant::now();
    let status = loop {
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                let _ = child.kill();
                let _ = child.wait();
                for t in drains {
                    let _ = t.join();
                }
                return Ok(InvokeResult::TimedOut);
            }
        }
        match child.try_wait()? {
            Some(status) => break status,
            None => std::thread::sleep(Duration::from_millis(20)),
        }
    };

    let mut streams = drains.into_iter().map(|t| t.join().unwrap_or_default());
    Ok(InvokeResult::Completed(RawOutput {
        stdout: streams.next().unwrap_or_default(),
        stderr: streams.next().unwrap_or_default(),
        status: status.code(),
    }))
}

fn drain(pipe: impl io::Read) -> String {
    let mut r = io::BufReader::new(pipe);
    let mut out: Vec<u8> = Vec::new();
    let mut buf: Vec<u8> = Vec::new();
    loop {
        buf.clear();
        match r.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => out.extend_from_slice(&buf),
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
