//! 租约续期判定

use chrono::{DateTime, Utc};

use crate::policy::ProcessorPolicy;

/// 每次轮询后的续期动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalDecision {
    /// 以新的超时时间续期
    Extend(DateTime<Utc>),
    /// 续期次数耗尽且租约已过期
    OutOfTime,
    /// 只上报状态，不改变超时时间
    StatusUpdate,
    Nothing,
}

/// 单个作业处理过程中的租约状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub next_timeout: DateTime<Utc>,
    pub next_update: DateTime<Utc>,
    pub timeout_count: u32,
}

impl JobRun {
    pub fn start(now: DateTime<Utc>, policy: &ProcessorPolicy) -> Self {
        Self {
            next_timeout: now + policy.initial_timeout,
            next_update: now + policy.update_interval,
            timeout_count: 0,
        }
    }

    pub fn evaluate(&mut self, now: DateTime<Utc>, policy: &ProcessorPolicy) -> RenewalDecision {
        let time_remaining = self.next_timeout - now;

        if time_remaining < policy.extension_threshold
            && self.timeout_count < policy.timeout_max_updates
        {
            self.next_timeout = self.next_timeout.max(now) + policy.timeout_extension;
            self.timeout_count += 1;
            return RenewalDecision::Extend(self.next_timeout);
        }

        if now >= self.next_timeout {
            return RenewalDecision::OutOfTime;
        }

        if now >= self.next_update {
            self.next_update += policy.update_interval;
            return RenewalDecision::StatusUpdate;
        }

        RenewalDecision::Nothing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn policy() -> ProcessorPolicy {
        ProcessorPolicy {
            initial_timeout: Duration::minutes(60),
            extension_threshold: Duration::minutes(5),
            timeout_extension: Duration::minutes(60),
            update_interval: Duration::minutes(5),
            timeout_max_updates: 2,
            ..ProcessorPolicy::default()
        }
    }

    #[test]
    fn test_nothing_with_ample_time() {
        let policy = policy();
        let mut run = JobRun::start(t0(), &policy);
        assert_eq!(
            run.evaluate(t0() + Duration::minutes(1), &policy),
            RenewalDecision::Nothing
        );
    }

    #[test]
    fn test_extends_near_expiry() {
        let policy = policy();
        let mut run = JobRun::start(t0(), &policy);
        run.next_update = t0() + Duration::hours(10);

        let decision = run.evaluate(t0() + Duration::minutes(57), &policy);
        assert_eq!(
            decision,
            RenewalDecision::Extend(t0() + Duration::minutes(120))
        );
        assert_eq!(run.timeout_count, 1);
    }

    #[test]
    fn test_extension_from_lapsed_lease_starts_at_now() {
        let policy = policy();
        let mut run = JobRun::start(t0(), &policy);
        run.next_update = t0() + Duration::hours(10);

        let late = t0() + Duration::minutes(90);
        assert_eq!(
            run.evaluate(late, &policy),
            RenewalDecision::Extend(late + Duration::minutes(60))
        );
    }

    #[test]
    fn test_out_of_time_after_budget_spent() {
        let policy = policy();
        let mut run = JobRun::start(t0(), &policy);
        run.timeout_count = policy.timeout_max_updates;

        assert_eq!(
            run.evaluate(t0() + Duration::minutes(60), &policy),
            RenewalDecision::OutOfTime
        );
        // 预算耗尽但尚未过期时不会提前放弃
        let mut fresh = JobRun::start(t0(), &policy);
        fresh.timeout_count = policy.timeout_max_updates;
        fresh.next_update = t0() + Duration::hours(10);
        assert_eq!(
            fresh.evaluate(t0() + Duration::minutes(58), &policy),
            RenewalDecision::Nothing
        );
    }

    #[test]
    fn test_status_update_cadence() {
        let policy = policy();
        let mut run = JobRun::start(t0(), &policy);

        assert_eq!(
            run.evaluate(t0() + Duration::minutes(5), &policy),
            RenewalDecision::StatusUpdate
        );
        assert_eq!(run.next_update, t0() + Duration::minutes(10));
        assert_eq!(
            run.evaluate(t0() + Duration::minutes(7), &policy),
            RenewalDecision::Nothing
        );
        // 落后多个周期时每次只前进一个间隔
        assert_eq!(
            run.evaluate(t0() + Duration::minutes(21), &policy),
            RenewalDecision::StatusUpdate
        );
        assert_eq!(run.next_update, t0() + Duration::minutes(15));
    }
}
