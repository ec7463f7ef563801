use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

type Callback<A> = Arc<dyn Fn(A) + Send + Sync>;

/// Trailing-edge debounce
///
/// Every [`call`](Self::call) cancels the armed timer and starts a new one;
/// the callback runs once, `delay` after the last call, with that call's
/// argument. The callback runs synchronously on the timer task, so a call
/// that re-arms while it is running cannot interrupt it.
///
/// Must be used from within a tokio runtime.
pub struct Debouncer<A> {
    delay: Duration,
    callback: Callback<A>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<A> Debouncer<A>
where
    A: Send + 'static,
{
    pub fn new<F>(delay: Duration, callback: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Self {
            delay,
            callback: Arc::new(callback),
            timer: Mutex::new(None),
        }
    }

    /// (Re)arm the timer with `args` as the pending argument
    pub fn call(&self, args: A) {
        let callback = self.callback.clone();
        let delay = self.delay;

        let mut timer = self.timer();
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(args);
        }));
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// True while a timer is armed and has not fired yet
    pub fn is_armed(&self) -> bool {
        self.timer().as_ref().is_some_and(|handle| !handle.is_finished())
    }

    fn timer(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A> Drop for Debouncer<A> {
    fn drop(&mut self) {
        let timer = self.timer.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = timer.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) + Send + Sync + 'static) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        (calls, move |n| sink.lock().unwrap().push(n))
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_to_last_call() {
        let (calls, callback) = recorder();
        let debounce = Debouncer::new(Duration::from_millis(500), callback);

        debounce.call(1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        debounce.call(2);
        tokio::time::sleep(Duration::from_millis(200)).await;
        debounce.call(3);

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(calls.lock().unwrap().is_empty());
        assert!(debounce.is_armed());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*calls.lock().unwrap(), vec![3]);
        assert!(!debounce.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_fire_separately() {
        let (calls, callback) = recorder();
        let debounce = Debouncer::new(Duration::from_millis(100), callback);

        debounce.call(1);
        tokio::time::sleep(Duration::from_millis(150)).await;
        debounce.call(2);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(*calls.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_armed_timer() {
        let (calls, callback) = recorder();
        let debounce = Debouncer::new(Duration::from_millis(100), callback);

        debounce.call(1);
        drop(debounce);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(calls.lock().unwrap().is_empty());
    }
}
