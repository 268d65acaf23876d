//! 会话监管：生命周期、中断管理
//!
//! 每条用户请求由 `begin()` 领取一个新的子 token；Ctrl+C 只取消当前请求，会话本身继续。
//! `shutdown()` 取消根 token，之后领取的 token 一律处于已取消状态。

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct SessionSupervisor {
    /// 会话根 token
    session: CancellationToken,
    /// 当前请求
    current: Mutex<CancellationToken>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        let session = CancellationToken::new();
        let current = Mutex::new(session.child_token());
        Self { session, current }
    }

    /// 开始一条新请求，返回它的 token
    pub fn begin(&self) -> CancellationToken {
        let token = self.session.child_token();
        match self.current.lock() {
            Ok(mut cur) => *cur = token.clone(),
            Err(poisoned) => *poisoned.into_inner() = token.clone(),
        }
        token
    }

    /// 取消当前请求（用户 Ctrl+C）
    pub fn cancel(&self) {
        let token = match self.current.lock() {
            Ok(cur) => cur.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        token.cancel();
    }

    /// 结束整个会话
    pub fn shutdown(&self) {
        self.session.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.session.is_cancelled()
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_only_hits_current_request() {
        let sup = SessionSupervisor::new();
        let first = sup.begin();
        sup.cancel();
        assert!(first.is_cancelled());

        let second = sup.begin();
        assert!(!second.is_cancelled());
        assert!(!sup.is_shut_down());
    }

    #[test]
    fn test_shutdown_cancels_everything() {
        let sup = SessionSupervisor::new();
        let running = sup.begin();
        sup.shutdown();
        assert!(running.is_cancelled());
        assert!(sup.begin().is_cancelled());
    }
}
