// src/executor/process_tree.rs

//! 进程组的终止。平台相关的只有 `signal_tree`，逐级升级的策略写在它之上，只写一次。

use log::{debug, warn};
use std::{io, time::Duration};
use tokio::process::{Child, Command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGINT / CTRL_BREAK_EVENT
    Interrupt,
    /// SIGTERM / taskkill
    Terminate,
    /// SIGKILL / taskkill /F
    Kill,
}

const STAGES: [StopSignal; 3] = [StopSignal::Interrupt, StopSignal::Terminate, StopSignal::Kill];

/// 让子进程成为新进程组的组长，之后的信号可以到达它派生的全部进程 (例如 ffmpeg)。
pub fn isolate_process_group(command: &mut Command) {
    #[cfg(unix)]
    {
        command.process_group(0);
    }
    #[cfg(windows)]
    {
        use windows_sys::Win32::System::Threading::{CREATE_NEW_PROCESS_GROUP, CREATE_NO_WINDOW};
        command.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
    }
}

/// 向以 `pid` 为组长的整个进程组发送信号
#[cfg(unix)]
pub fn signal_tree(pid: u32, signal: StopSignal) -> io::Result<()> {
    let sig = match signal {
        StopSignal::Interrupt => libc::SIGINT,
        StopSignal::Terminate => libc::SIGTERM,
        StopSignal::Kill => libc::SIGKILL,
    };
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid 超出范围"))?;
    // SAFETY: killpg 只接收整数参数，没有内存方面的前置条件
    let rc = unsafe { libc::killpg(pgid, sig) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(windows)]
pub fn signal_tree(pid: u32, signal: StopSignal) -> io::Result<()> {
    match signal {
        StopSignal::Interrupt => {
            use windows_sys::Win32::System::Console::{CTRL_BREAK_EVENT, GenerateConsoleCtrlEvent};
            // SAFETY: 纯 FFI 调用，参数是进程组 ID
            let ok = unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) };
            if ok != 0 {
                Ok(())
            } else {
                Err(io::Error::last_os_error())
            }
        }
        StopSignal::Terminate => taskkill(pid, false),
        StopSignal::Kill => taskkill(pid, true),
    }
}

#[cfg(windows)]
fn taskkill(pid: u32, force: bool) -> io::Result<()> {
    let mut cmd = std::process::Command::new("taskkill");
    cmd.arg("/T").arg("/PID").arg(pid.to_string());
    if force {
        cmd.arg("/F");
    }
    let status = cmd
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("taskkill 退出码 {:?}", status.code())))
    }
}

fn has_exited(child: &mut Child) -> bool {
    // try_wait 出错时无法再判断状态，按已退出处理
    !matches!(child.try_wait(), Ok(None))
}

/// 逐级终止: 中断 -> 终止 -> 强制结束，每一级之后等待 `grace`。
/// 进程已经退出时跳过剩余级别; 信号发送失败会被忽略并继续升级。
pub async fn stop_process_tree(child: &mut Child, grace: Duration) {
    let Some(pid) = child.id() else {
        debug!("进程已被回收，无需终止");
        return;
    };

    for stage in STAGES {
        if has_exited(child) {
            debug!("进程 {} 已退出，跳过 {:?}", pid, stage);
            sweep_group(pid);
            return;
        }
        debug!("向进程组 {} 发送 {:?}", pid, stage);
        if let Err(e) = signal_tree(pid, stage) {
            debug!("发送 {:?} 到进程组 {} 失败 (忽略): {}", stage, pid, e);
        }
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("进程 {} 在 {:?} 后退出: {}", pid, stage, status);
                sweep_group(pid);
                return;
            }
            Ok(Err(e)) => {
                warn!("等待进程 {} 退出时出错: {}", pid, e);
                return;
            }
            Err(_) => continue,
        }
    }
    warn!("进程组 {} 在所有终止级别后仍未退出", pid);
}

/// 组长退出后，组内可能还残留忽略了中断信号的成员 (例如 sh 在后台启动的进程)
fn sweep_group(pid: u32) {
    #[cfg(unix)]
    if signal_tree(pid, StopSignal::Kill).is_ok() {
        debug!("已强制结束进程组 {} 中的剩余进程", pid);
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// 意外退出路径上的兜底: 同步地强制结束整个进程组
pub(crate) struct TreeGuard {
    pid: Option<u32>,
}

impl TreeGuard {
    pub(crate) fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }

    pub(crate) fn disarm(&mut self) {
        self.pid = None;
    }
}

impl Drop for TreeGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            warn!("执行器提前返回，强制结束进程组 {}", pid);
            let _ = signal_tree(pid, StopSignal::Kill);
        }
    }
}
