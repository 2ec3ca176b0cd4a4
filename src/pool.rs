//! Bounded, order-preserving fan-out.
//!
//! Both the document level (pipeline) and the page level (OCR) run the same
//! shape of work: N independent I/O-bound jobs, at most `width` in flight,
//! results wanted in input order. Completion order is arbitrary, so every
//! result is written into a slot pre-allocated for its input index.
//!
//! ```text
//! items ──▶ [ width in flight ] ──▶ slot[i]  (completion order ignored)
//! ```

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// Run `f` over every item with at most `width` futures in flight.
///
/// Items are taken by value so the futures borrow nothing from the caller's
/// collection. The returned vector is in input order.
pub async fn map_bounded<T, R, I, F, Fut>(items: I, width: usize, f: F) -> Vec<R>
where
    I: IntoIterator<Item = T>,
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = R>,
{
    let items: Vec<T> = items.into_iter().collect();
    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(items.len()).collect();

    let mut completed = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = f(index, item);
            async move { (index, fut.await) }
        })
        .buffer_unordered(width.max(1));

    while let Some((index, result)) = completed.next().await {
        slots[index] = Some(result);
    }

    slots.into_iter().flatten().collect()
}

/// Fail-fast variant of [`map_bounded`].
///
/// After the first `Err`, no new item is started; futures already in flight
/// are driven to completion, then the first error is returned. No partial
/// result escapes on failure.
pub async fn try_map_bounded<T, R, E, I, F, Fut>(items: I, width: usize, f: F) -> Result<Vec<R>, E>
where
    I: IntoIterator<Item = T>,
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    let items: Vec<T> = items.into_iter().collect();
    let aborted = AtomicBool::new(false);
    let mut first_error: Option<E> = None;
    let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(items.len()).collect();

    {
        let aborted = &aborted;
        let f = &f;
        let mut completed = stream::iter(items.into_iter().enumerate())
            .map(move |(index, item)| {
                // Checked when the item is pulled into the window, not when its
                // future is first polled: an admitted item always runs.
                let fut = (!aborted.load(Ordering::SeqCst)).then(|| f(index, item));
                async move {
                    match fut {
                        Some(fut) => (index, Some(fut.await)),
                        None => (index, None),
                    }
                }
            })
            .buffer_unordered(width.max(1));

        while let Some((index, result)) = completed.next().await {
            match result {
                Some(Ok(value)) => slots[index] = Some(value),
                Some(Err(e)) => {
                    aborted.store(true, Ordering::SeqCst);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                None => {}
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(slots.into_iter().flatten().collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn results_follow_input_order_not_completion_order() {
        let delays = [40u64, 5, 25, 1];
        let out = map_bounded(delays, 4, |index, delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            index * 10
        })
        .await;
        assert_eq!(out, vec![0, 10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn width_bounds_concurrency() {
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let items: Vec<u32> = (0..9).collect();

        map_bounded(items, 2, |_, _| {
            let in_flight = &in_flight;
            let peak = &peak;
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_width_is_treated_as_one() {
        let out = map_bounded([1, 2, 3], 0, |_, v| async move { v + 1 }).await;
        assert_eq!(out, vec![2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn try_map_stops_dispatching_after_failure() {
        let started = AtomicUsize::new(0);
        let items: Vec<usize> = (0..10).collect();

        let result: Result<Vec<usize>, String> = try_map_bounded(items, 2, |index, _| {
            let started = &started;
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                if index == 1 {
                    Err(format!("item {index} failed"))
                } else {
                    Ok(index)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), "item 1 failed");
        assert!(started.load(Ordering::SeqCst) < 10);
    }

    #[tokio::test(start_paused = true)]
    async fn try_map_lets_in_flight_work_finish() {
        let finished = AtomicUsize::new(0);
        let items = [0usize, 1];

        let result: Result<Vec<()>, &str> = try_map_bounded(items, 2, |index, _| {
            let finished = &finished;
            async move {
                if index == 0 {
                    return Err("fast failure");
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn try_map_success_keeps_order() {
        let out: Result<Vec<String>, ()> =
            try_map_bounded(["a", "b", "c"], 3, |i, s| async move { Ok(format!("{i}{s}")) })
                .await;
        assert_eq!(out.unwrap(), vec!["0a", "1b", "2c"]);
    }
}
