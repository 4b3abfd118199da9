use std::time::Duration;

use tracing::info;

use super::GameProcess;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll until the game shows up. No timeout.
pub async fn wait_until_running(game: &dyn GameProcess, interval: Duration) {
    if game.is_running() {
        return;
    }
    info!("Waiting for Minecraft to start...");
    loop {
        tokio::time::sleep(interval).await;
        if game.is_running() {
            info!("Minecraft is running");
            return;
        }
    }
}

/// Poll until the game is gone. No timeout.
pub async fn wait_until_exited(game: &dyn GameProcess, interval: Duration) {
    if !game.is_running() {
        return;
    }
    info!("Waiting for Minecraft to exit...");
    loop {
        tokio::time::sleep(interval).await;
        if !game.is_running() {
            info!("Minecraft has exited");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Reports running for polls `[start, stop)`.
    struct Scripted {
        polls: AtomicUsize,
        start: usize,
        stop: usize,
    }

    impl GameProcess for Scripted {
        fn is_running(&self) -> bool {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            n >= self.start && n < self.stop
        }

        fn launch(&self, _launcher: &Path) -> bool {
            true
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_through_start_and_exit() {
        let game = Scripted {
            polls: AtomicUsize::new(0),
            start: 3,
            stop: 6,
        };

        wait_until_running(&game, DEFAULT_POLL_INTERVAL).await;
        assert_eq!(game.polls.load(Ordering::SeqCst), 4);

        wait_until_exited(&game, DEFAULT_POLL_INTERVAL).await;
        assert_eq!(game.polls.load(Ordering::SeqCst), 7);
    }
}
