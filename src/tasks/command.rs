//! # Subprocess task body.
//!
//! [`CommandBody`] runs an external program (typically a verification
//! backend) as a child OS process:
//!
//! - stdout and stderr are appended to the task's log file;
//! - the working directory is the task's work dir;
//! - the issued budget is enforced with rlimits (see [`attach_rlimits`]);
//! - the child is reaped with `wait4`, whose `rusage` feeds the task's usage.
//!
//! ## Outcome mapping
//! ```text
//! cancellation            → Canceled   (SIGTERM, SIGKILL after KILL_GRACE)
//! wall limit expired      → Timeout    (SIGTERM, SIGKILL after KILL_GRACE)
//! SIGXCPU / SIGKILL ≥ cpu → Timeout
//! exit 0                  → Ok
//! rss ≥ memory / SIGKILL  → OutOfMemory  (only under a memory limit)
//! anything else           → Fail
//! ```

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::tasks::context::TaskContext;
use crate::tasks::runnable::{Runnable, RunnableRef};

/// Time between `SIGTERM` and `SIGKILL` when terminating a child process.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

/// Runs an external program as the task body.
#[derive(Clone, Debug)]
pub struct CommandBody {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandBody {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn arc(self) -> RunnableRef {
        std::sync::Arc::new(self)
    }
}

#[async_trait]
impl Runnable for CommandBody {
    #[cfg(unix)]
    async fn run(&self, ctx: TaskContext) -> Result<(), TaskError> {
        unix::run(self, &ctx).await
    }

    #[cfg(not(unix))]
    async fn run(&self, _ctx: TaskContext) -> Result<(), TaskError> {
        Err(TaskError::Fatal {
            error: format!("{}: subprocess bodies need a Unix host", self.program),
        })
    }
}

#[cfg(unix)]
mod unix {
    use std::fs::OpenOptions;
    use std::io;
    use std::process::{Command, Stdio};
    use std::time::Duration;

    use tokio::task::JoinHandle;
    use tokio::time::{self, Instant};
    use tracing::{debug, trace};

    use super::{CommandBody, KILL_GRACE};
    use crate::error::TaskError;
    use crate::governor::{ResourceLimits, attach_rlimits};
    use crate::tasks::context::TaskContext;
    use crate::tasks::usage::ResourceUsage;

    /// Bytes per unit of `ru_maxrss`.
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    const RSS_UNIT: u64 = 1;
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    const RSS_UNIT: u64 = 1024;

    pub(super) struct Exit {
        pub(super) status: libc::c_int,
        pub(super) cpu: Duration,
        pub(super) max_rss: u64,
    }

    type Reaper = JoinHandle<io::Result<Exit>>;

    /// Sends `SIGKILL` if the body future is dropped while the child is unreaped.
    struct KillOnDrop(Option<libc::pid_t>);

    impl KillOnDrop {
        fn disarm(&mut self) {
            self.0 = None;
        }
    }

    impl Drop for KillOnDrop {
        fn drop(&mut self) {
            if let Some(pid) = self.0 {
                signal(pid, libc::SIGKILL);
            }
        }
    }

    pub(super) async fn run(body: &CommandBody, ctx: &TaskContext) -> Result<(), TaskError> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(ctx.log_file())
            .map_err(|e| fatal("open log", e))?;
        let log_err = log.try_clone().map_err(|e| fatal("open log", e))?;

        let mut cmd = Command::new(&body.program);
        cmd.args(&body.args)
            .envs(body.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(ctx.work_dir())
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err);
        attach_rlimits(&mut cmd, ctx.limits());

        trace!(task = %ctx.id(), program = %body.program, args = ?body.args, "spawn");
        let child = cmd
            .spawn()
            .map_err(|e| fatal(&format!("spawn {}", body.program), e))?;
        let pid = child.id() as libc::pid_t;
        let mut guard = KillOnDrop(Some(pid));
        let started = Instant::now();
        let mut reap: Reaper = tokio::task::spawn_blocking(move || wait4(pid));

        let mut canceled = false;
        let mut expired = false;
        let reaped = tokio::select! {
            r = &mut reap => r,
            _ = ctx.cancelled() => {
                debug!(task = %ctx.id(), pid, "cancelled; terminating child");
                canceled = true;
                terminate(pid, &mut reap).await
            }
            _ = wall_limit(ctx.limits().wall_time) => {
                debug!(task = %ctx.id(), pid, "wall-time limit; terminating child");
                expired = true;
                terminate(pid, &mut reap).await
            }
        };
        guard.disarm();
        drop(child);

        let exit = reaped
            .map_err(|e| TaskError::Fatal {
                error: format!("reaper: {e}"),
            })?
            .map_err(|e| fatal("wait4", e))?;

        ctx.record_usage(&ResourceUsage {
            wall_time: started.elapsed(),
            cpu_time: exit.cpu,
            memory_bytes: exit.max_rss,
        });
        debug!(
            task = %ctx.id(),
            status = exit.status,
            cpu = ?exit.cpu,
            max_rss = exit.max_rss,
            "child reaped"
        );
        classify(&exit, ctx.limits(), canceled, expired)
    }

    async fn wall_limit(limit: Option<Duration>) {
        match limit.filter(|d| !d.is_zero()) {
            Some(d) => time::sleep(d).await,
            None => std::future::pending().await,
        }
    }

    async fn terminate(
        pid: libc::pid_t,
        reap: &mut Reaper,
    ) -> Result<io::Result<Exit>, tokio::task::JoinError> {
        signal(pid, libc::SIGTERM);
        match time::timeout(KILL_GRACE, &mut *reap).await {
            Ok(r) => r,
            Err(_) => {
                signal(pid, libc::SIGKILL);
                reap.await
            }
        }
    }

    fn signal(pid: libc::pid_t, sig: libc::c_int) {
        // SAFETY: `pid` is our unreaped child, so it cannot have been recycled.
        unsafe {
            libc::kill(pid, sig);
        }
    }

    fn wait4(pid: libc::pid_t) -> io::Result<Exit> {
        let mut status: libc::c_int = 0;
        // SAFETY: `rusage` is plain old data; zeroed is a valid value.
        let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
        loop {
            // SAFETY: pointers are valid for the duration of the call.
            let rc = unsafe { libc::wait4(pid, &mut status, 0, &mut ru) };
            if rc == pid {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
        Ok(Exit {
            status,
            cpu: timeval(ru.ru_utime) + timeval(ru.ru_stime),
            max_rss: (ru.ru_maxrss.max(0) as u64).saturating_mul(RSS_UNIT),
        })
    }

    fn timeval(tv: libc::timeval) -> Duration {
        Duration::from_secs(tv.tv_sec.max(0) as u64) + Duration::from_micros(tv.tv_usec.max(0) as u64)
    }

    pub(super) fn classify(
        exit: &Exit,
        limits: &ResourceLimits,
        canceled: bool,
        expired: bool,
    ) -> Result<(), TaskError> {
        if canceled {
            return Err(TaskError::Canceled);
        }
        if expired {
            return Err(TaskError::Timeout {
                limit: limits.wall_time.unwrap_or_default(),
            });
        }

        let signal = libc::WIFSIGNALED(exit.status).then(|| libc::WTERMSIG(exit.status));
        let clean = signal.is_none() && libc::WEXITSTATUS(exit.status) == 0;
        if clean {
            return Ok(());
        }
        if let Some(cpu) = limits.cpu_time {
            let over = signal == Some(libc::SIGKILL) && exit.cpu >= cpu;
            if signal == Some(libc::SIGXCPU) || over {
                return Err(TaskError::Timeout { limit: cpu });
            }
        }
        if let Some(limit) = limits.memory_bytes {
            if exit.max_rss >= limit || signal == Some(libc::SIGKILL) {
                return Err(TaskError::OutOfMemory { limit });
            }
        }

        match signal {
            Some(sig) => Err(TaskError::fail(format!("terminated by signal {sig}"))),
            None => Err(TaskError::fail(format!(
                "exit code: {}",
                libc::WEXITSTATUS(exit.status)
            ))),
        }
    }

    fn fatal(what: &str, e: io::Error) -> TaskError {
        TaskError::Fatal {
            error: format!("{what}: {e}"),
        }
    }
}
