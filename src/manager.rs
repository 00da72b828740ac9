use chrono::Utc;

use crate::db::{self, DbPool};
use crate::duty::Duty;
use crate::errors::DutyError;
use crate::users::User;

/// Registry of the duties currently on watch.
///
/// The manager owns no state of its own beyond the database pool; every
/// loaded handle sees the same registry.
pub struct DutyManager {
    pool: DbPool,
}

impl DutyManager {
    /// Maximum duties the registry holds at once.
    pub const MAX_DUTY: i64 = 2;

    pub fn load(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Start a duty for a user, optionally on behalf of a debtee who owed
    /// the shift.
    pub async fn start_duty(
        &self,
        user: &User,
        debtee: Option<&User>,
    ) -> Result<Duty, DutyError> {
        if self.is_onduty(user).await? {
            return Err(DutyError::UnfinishedDuty);
        }

        let registered = db::registered_duties(&self.pool).await?;
        if registered.len() as i64 >= Self::MAX_DUTY {
            // A registry filled entirely by other members' ongoing shifts
            // reads as a handover problem rather than a capacity one.
            if registered
                .iter()
                .all(|duty| duty.user_id.is_some() && !duty.is_finished())
            {
                return Err(DutyError::CannotStartOverOngoingDuty);
            }
            return Err(DutyError::MaxDutyCount);
        }

        let mut duty = Duty::starting_at(Utc::now());
        duty.user_id = Some(user.id);
        duty.debtee_id = debtee.map(|debtee| debtee.id);
        duty.id = db::insert_duty(&self.pool, &duty).await?;

        tracing::info!(duty_id = duty.id, user = %user.matric, "duty started");
        Ok(duty)
    }

    pub async fn active_duties(&self) -> Result<Vec<Duty>, DutyError> {
        Ok(db::registered_duties(&self.pool).await?)
    }

    pub async fn is_onduty(&self, user: &User) -> Result<bool, DutyError> {
        let duties = db::registered_duties_of(&self.pool, user.id).await?;
        Ok(duties.iter().any(|duty| !duty.is_finished()))
    }

    pub async fn get_duties_of(&self, user: &User) -> Result<Vec<Duty>, DutyError> {
        Ok(db::registered_duties_of(&self.pool, user.id).await?)
    }

    /// Registered duties whose end time has already passed.
    pub async fn filter_finished_duties(&self) -> Result<Vec<Duty>, DutyError> {
        let duties = db::registered_duties(&self.pool).await?;
        Ok(duties.into_iter().filter(Duty::is_finished).collect())
    }

    /// Deregister every finished duty, returning them. The duty rows stay in
    /// the database as history.
    pub async fn remove_finished_duties(&self) -> Result<Vec<Duty>, DutyError> {
        let finished = self.filter_finished_duties().await?;
        for duty in &finished {
            db::deregister_duty(&self.pool, duty.id).await?;
            tracing::info!(duty_id = duty.id, "finished duty deregistered");
        }
        Ok(finished)
    }

    /// Deregister one duty. An unfinished duty is refused unless forced, in
    /// which case its end is warped back to now first.
    pub async fn clear_duty(&self, duty_id: i64, force: bool) -> Result<Duty, DutyError> {
        let registered = db::registered_duties(&self.pool).await?;
        let Some(mut duty) = registered.into_iter().find(|duty| duty.id == duty_id) else {
            return Err(DutyError::NotRegistered(duty_id));
        };

        if !duty.is_finished() {
            if !force {
                return Err(DutyError::CannotClearUnfinishedDuty {
                    duty_end: duty.duty_end.format("%d %b %Y, %H:%M:%S").to_string(),
                });
            }
            duty.force_finish();
            db::update_duty_times(&self.pool, &duty).await?;
        }

        db::deregister_duty(&self.pool, duty.id).await?;
        tracing::info!(duty_id = duty.id, force, "duty cleared");
        Ok(duty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::NewUser;

    async fn make_user(pool: &DbPool, matric: &str) -> User {
        let email = format!("{}@example.com", matric.to_lowercase());
        let id = db::insert_user(pool, &NewUser::member(email, matric, matric))
            .await
            .unwrap();
        db::get_user(pool, id).await.unwrap().unwrap()
    }

    async fn finish_and_persist(pool: &DbPool, duty: &mut Duty) {
        duty.force_finish();
        db::update_duty_times(pool, duty).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_duty_registers_for_user() {
        let pool = db::test_pool().await;
        let manager = DutyManager::load(pool.clone());
        let user = make_user(&pool, "A17CS0001").await;

        assert!(!manager.is_onduty(&user).await.unwrap());
        assert!(manager.active_duties().await.unwrap().is_empty());

        let duty = manager.start_duty(&user, None).await.unwrap();

        assert!(manager.is_onduty(&user).await.unwrap());
        assert_eq!(manager.active_duties().await.unwrap().len(), 1);
        assert_eq!(manager.get_duties_of(&user).await.unwrap()[0], duty);
        assert!(duty.debtee_id.is_none());
    }

    #[tokio::test]
    async fn test_start_duty_with_debtee() {
        let pool = db::test_pool().await;
        let manager = DutyManager::load(pool.clone());
        let user = make_user(&pool, "A17CS0001").await;
        let debtee = make_user(&pool, "A17CS0002").await;

        let duty = manager.start_duty(&user, Some(&debtee)).await.unwrap();

        assert_eq!(duty.user_id, Some(user.id));
        assert_eq!(duty.debtee_id, Some(debtee.id));
        // The debt is the debtee's, but the duty is not
        assert!(!manager.is_onduty(&debtee).await.unwrap());
    }

    #[tokio::test]
    async fn test_start_duty_refuses_second_unfinished_duty() {
        let pool = db::test_pool().await;
        let manager = DutyManager::load(pool.clone());
        let user = make_user(&pool, "A17CS0001").await;

        manager.start_duty(&user, None).await.unwrap();
        let err = manager.start_duty(&user, None).await.unwrap_err();
        assert!(matches!(err, DutyError::UnfinishedDuty));
    }

    #[tokio::test]
    async fn test_start_duty_over_full_registry_of_ongoing_duties() {
        let pool = db::test_pool().await;
        let manager = DutyManager::load(pool.clone());

        for n in 0..DutyManager::MAX_DUTY {
            let user = make_user(&pool, &format!("A17CS000{}", n)).await;
            manager.start_duty(&user, None).await.unwrap();
        }

        let late = make_user(&pool, "A17CS0099").await;
        let err = manager.start_duty(&late, None).await.unwrap_err();
        assert!(matches!(err, DutyError::CannotStartOverOngoingDuty));
    }

    #[tokio::test]
    async fn test_start_duty_over_zombie_slot_hits_capacity() {
        let pool = db::test_pool().await;
        let manager = DutyManager::load(pool.clone());

        // A zombie duty occupies one slot, a member the other
        db::insert_duty(&pool, &Duty::starting_at(Utc::now())).await.unwrap();
        let holder = make_user(&pool, "A17CS0001").await;
        manager.start_duty(&holder, None).await.unwrap();

        let late = make_user(&pool, "A17CS0099").await;
        let err = manager.start_duty(&late, None).await.unwrap_err();
        assert!(matches!(err, DutyError::MaxDutyCount));
    }

    #[tokio::test]
    async fn test_filter_and_remove_finished_duties() {
        let pool = db::test_pool().await;
        let manager = DutyManager::load(pool.clone());

        let mut duties = Vec::new();
        for _ in 0..4 {
            let mut duty = Duty::starting_at(Utc::now());
            duty.id = db::insert_duty(&pool, &duty).await.unwrap();
            duties.push(duty);
        }

        finish_and_persist(&pool, &mut duties[0]).await;
        finish_and_persist(&pool, &mut duties[1]).await;

        let finished = manager.filter_finished_duties().await.unwrap();
        assert_eq!(finished.len(), 2);
        let finished_ids: Vec<i64> = finished.iter().map(|duty| duty.id).collect();
        assert!(finished_ids.contains(&duties[0].id));
        assert!(finished_ids.contains(&duties[1].id));
        // Filtering alone removes nothing
        assert_eq!(manager.active_duties().await.unwrap().len(), 4);

        let removed = manager.remove_finished_duties().await.unwrap();
        assert_eq!(removed.len(), 2);

        let remaining = manager.active_duties().await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|duty| duty.id == duties[2].id));
        assert!(remaining.iter().any(|duty| duty.id == duties[3].id));
    }

    #[tokio::test]
    async fn test_clear_duty_refuses_unfinished_unless_forced() {
        let pool = db::test_pool().await;
        let manager = DutyManager::load(pool.clone());
        let user = make_user(&pool, "A17CS0001").await;

        let duty = manager.start_duty(&user, None).await.unwrap();

        let err = manager.clear_duty(duty.id, false).await.unwrap_err();
        assert!(matches!(err, DutyError::CannotClearUnfinishedDuty { .. }));

        let cleared = manager.clear_duty(duty.id, true).await.unwrap();
        assert!(cleared.is_finished());
        assert!(manager.active_duties().await.unwrap().is_empty());
        assert!(matches!(
            manager.clear_duty(duty.id, true).await.unwrap_err(),
            DutyError::NotRegistered(_)
        ));
    }
}
