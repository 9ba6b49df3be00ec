use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// 协作式停止信号
///
/// 处理器每轮询一次检查一次，不会打断正在进行的外部调用。
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn request_stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    /// 休眠指定时长，期间收到停止信号则提前返回 `true`
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut rx = self.tx.subscribe();
        if *rx.borrow_and_update() {
            return true;
        }
        let stopped = async {
            while rx.changed().await.is_ok() {
                if *rx.borrow_and_update() {
                    return true;
                }
            }
            false
        };
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_stopped(),
            stopped = stopped => stopped,
        }
    }
}
