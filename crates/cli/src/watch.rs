//! Following an import job until it finishes.

use hopper_core::wizard::ProcessingView;
use providers::JobSubscription;

/// Reports every distinct view until progress hits 100 or the feed stops.
/// Returns the last view seen.
pub async fn follow_job<F>(subscription: &mut JobSubscription, mut report: F) -> ProcessingView
where
    F: FnMut(&ProcessingView),
{
    let mut last = ProcessingView::from(&subscription.latest());
    report(&last);
    while !last.is_complete() {
        let Some(record) = subscription.changed().await else {
            break;
        };
        let view = ProcessingView::from(&record);
        if view != last {
            report(&view);
            last = view;
        }
    }
    last
}
