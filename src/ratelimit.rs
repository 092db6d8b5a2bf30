use governor::{
    Quota, RateLimiter as GovernorRateLimiter,
    clock::{QuantaClock, QuantaInstant},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use nonzero_ext::nonzero;
use std::{num::NonZeroU32, time::Duration};

// Gentle on purpose: every request carries a logged-in session cookie and
// Moodle will rate-ban accounts that hammer it.
const REQ_PER_SEC: NonZeroU32 = nonzero!(5u32);
const MS_BETWEEN_REQ: Duration = Duration::from_millis(150);

type SpecificGovernorRateLimiter =
    GovernorRateLimiter<NotKeyed, InMemoryState, QuantaClock, NoOpMiddleware<QuantaInstant>>;

pub struct RateLimiter {
    req_per_sec: SpecificGovernorRateLimiter,
    ms_between_req: SpecificGovernorRateLimiter,
}

impl RateLimiter {
    pub fn new() -> Self {
        // Limit to X total req/sec on average.
        let req_per_sec = GovernorRateLimiter::direct(Quota::per_second(REQ_PER_SEC));

        // Limit to Y req/ms (i.e. no two requests closer than Y ms).
        let ms_between_req =
            GovernorRateLimiter::direct(Quota::with_period(MS_BETWEEN_REQ).unwrap());

        RateLimiter {
            req_per_sec,
            ms_between_req,
        }
    }

    pub async fn wait_until_ready(&self) {
        // Order matters: clear the per-second budget first, then the
        // spacing gate, so callers queued on the budget cannot all cross
        // the spacing gate in one burst.
        self.req_per_sec.until_ready().await;
        self.ms_between_req.until_ready().await;
    }
}
