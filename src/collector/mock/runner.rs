//! In-memory command runner for testing collectors without kubectl.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::collector::traits::{BackgroundProcess, CommandRunner, ProcessOutput};

#[derive(Debug, Clone)]
enum Scripted {
    Stdout(String),
    Failure(String),
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<String>,
    spawned: Vec<String>,
    kills: usize,
    next_pid: u32,
}

/// Command runner answering from a table of scripted responses.
///
/// Commands are matched on their arguments joined with a single space; the
/// binary name is ignored. Unscripted commands fail like a non-zero exit.
/// Background processes always start (unless `fail_spawns` was called) and
/// count every `kill` made on them.
#[derive(Debug, Clone, Default)]
pub struct MockRunner {
    responses: HashMap<String, Scripted>,
    spawn_fails: bool,
    kill_fails: bool,
    state: Arc<Mutex<State>>,
}

impl MockRunner {
    /// Creates a runner with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a successful command with the given stdout.
    pub fn respond<I, S>(&mut self, args: I, stdout: impl Into<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.responses
            .insert(key(args), Scripted::Stdout(stdout.into()));
    }

    /// Scripts a command that exits non-zero with the given stderr.
    pub fn fail<I, S>(&mut self, args: I, stderr: impl Into<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.responses
            .insert(key(args), Scripted::Failure(stderr.into()));
    }

    /// Makes every background spawn fail.
    pub fn fail_spawns(&mut self) {
        self.spawn_fails = true;
    }

    /// Makes every background kill report an error (it is still counted).
    pub fn fail_kills(&mut self) {
        self.kill_fails = true;
    }

    /// Foreground commands run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Background commands started so far, in order.
    pub fn spawned(&self) -> Vec<String> {
        self.lock().spawned.clone()
    }

    /// Number of kills issued on background processes.
    pub fn kills(&self) -> usize {
        self.lock().kills
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A test that panicked while holding the lock leaves usable data.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn key<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

impl CommandRunner for MockRunner {
    fn output(&self, _program: &str, args: &[String]) -> io::Result<ProcessOutput> {
        let key = key(args);
        self.lock().calls.push(key.clone());

        Ok(match self.responses.get(&key) {
            Some(Scripted::Stdout(stdout)) => ProcessOutput {
                success: true,
                status: "exit status: 0".to_string(),
                stdout: stdout.clone(),
                stderr: String::new(),
            },
            Some(Scripted::Failure(stderr)) => ProcessOutput {
                success: false,
                status: "exit status: 1".to_string(),
                stdout: String::new(),
                stderr: stderr.clone(),
            },
            None => ProcessOutput {
                success: false,
                status: "exit status: 1".to_string(),
                stdout: String::new(),
                stderr: format!("no scripted response for '{}'", key),
            },
        })
    }

    fn spawn(&self, _program: &str, args: &[String]) -> io::Result<Box<dyn BackgroundProcess>> {
        if self.spawn_fails {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "scripted spawn failure",
            ));
        }

        let mut state = self.lock();
        state.spawned.push(key(args));
        state.next_pid += 1;
        Ok(Box::new(MockProcess {
            pid: 1000 + state.next_pid,
            fails: self.kill_fails,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockProcess {
    pid: u32,
    fails: bool,
    state: Arc<Mutex<State>>,
}

impl BackgroundProcess for MockProcess {
    fn id(&self) -> u32 {
        self.pid
    }

    fn kill(&mut self) -> io::Result<()> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).kills += 1;
        if self.fails {
            return Err(io::Error::other("scripted kill failure"));
        }
        Ok(())
    }
}
