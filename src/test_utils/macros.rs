/// Polls a condition until it holds, yielding to the runtime between attempts.
///
/// Background tasks (subscription, gap monitor, backfill) make progress concurrently with the
/// test body, so their effects are asserted with a deadline instead of at a fixed point.
///
/// # Examples
///
/// ```no_run
/// # use chain_log_monitor::assert_eventually;
/// # async fn example(sink: chain_log_monitor::collaborators::MemorySink) {
/// assert_eventually!(sink.len() == 3);
/// assert_eventually!(sink.len() == 3, timeout = 10);
/// # }
/// ```
///
/// # Panics
///
/// If the condition is still false after the timeout (default 5 seconds).
#[macro_export]
macro_rules! assert_eventually {
    ($cond: expr) => {
        $crate::assert_eventually!($cond, timeout = 5)
    };
    ($cond: expr, timeout = $secs: expr) => {
        let satisfied = tokio::time::timeout(std::time::Duration::from_secs($secs), async {
            loop {
                if $cond {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await;
        assert!(satisfied.is_ok(), "condition not met within {}s: {}", $secs, stringify!($cond));
    };
}

/// Asserts the exact `(block_number, log_index)` sequence stored in a
/// [`MemorySink`](crate::collaborators::MemorySink).
#[macro_export]
macro_rules! assert_emitted {
    ($sink: expr, [$($entry:expr),* $(,)?]) => {
        let expected: Vec<(u64, u64)> = vec![$($entry),*];
        let actual = $crate::test_utils::emitted(&$sink);
        assert_eq!(actual, expected, "unexpected emitted transactions");
    };
}

#[cfg(test)]
mod tests {
    use crate::{
        collaborators::{MemorySink, TransactionSink},
        test_utils::transaction_at,
    };

    #[tokio::test]
    async fn eventually_sees_background_progress() {
        let sink = std::sync::Arc::new(MemorySink::new(10));
        let writer = sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            writer.emit(transaction_at(7));
        });

        assert_eventually!(sink.len() == 1);
        assert_emitted!(sink, [(7, 0)]);
    }

    #[tokio::test]
    #[should_panic(expected = "condition not met")]
    async fn eventually_panics_after_timeout() {
        assert_eventually!(false, timeout = 0);
    }
}
