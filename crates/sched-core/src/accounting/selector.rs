//! Decides which campaign a newly submitted job joins.

use crate::types::{CampaignId, User};

/// Groups jobs submitted close together into the same campaign. A job
/// joins the user's most recently created active campaign if it arrives
/// within `threshold` seconds of that campaign's creation; failing that,
/// it reactivates the most recently completed campaign if that one was
/// created within `threshold` seconds of the submit time; failing that,
/// it starts a new campaign.
pub struct Selector {
    pub threshold: i64,
}

impl Selector {
    pub fn new(threshold: i64) -> Self {
        Self { threshold }
    }

    pub fn select_campaign(&self, user: &mut User, now: i64) -> CampaignId {
        if let Some(id) = user.last_active_camp() {
            if now - user.campaign(id).created < self.threshold {
                return id;
            }
        }

        if let Some(id) = user.last_completed_camp() {
            if now - user.campaign(id).created < self.threshold {
                user.resurrect_campaign(id);
                return id;
            }
        }

        user.create_campaign(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_the_recent_campaign_within_threshold() {
        let selector = Selector::new(600);
        let mut user = User::new(1, 1.0);
        let first = selector.select_campaign(&mut user, 0);
        user.campaign_mut(first).add_job(10, 1);

        let second = selector.select_campaign(&mut user, 300);
        assert_eq!(second, first);
    }

    #[test]
    fn starts_a_new_campaign_past_threshold() {
        let selector = Selector::new(600);
        let mut user = User::new(1, 1.0);
        let first = selector.select_campaign(&mut user, 0);
        user.campaign_mut(first).add_job(10, 1);

        let second = selector.select_campaign(&mut user, 1000);
        assert_ne!(second, first);
    }

    #[test]
    fn resurrects_a_recently_completed_campaign() {
        let selector = Selector::new(600);
        let mut user = User::new(1, 1.0);
        let first = selector.select_campaign(&mut user, 0);
        user.campaign_mut(first).add_job(10, 1);
        user.add_virtual(10.0);
        user.redistribute_virtual();
        user.retire_finished_campaigns();
        assert!(!user.active());

        let again = selector.select_campaign(&mut user, 100);
        assert_eq!(again, first);
        assert!(user.active());
    }
}
