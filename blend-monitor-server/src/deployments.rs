use crate::db::models::{Deployment, DeploymentStatus, NewDeployment};
use crate::db::DbError;

/// Works out which deployment a rollback of `target` restores.
///
/// `history` may hold any deployments; only successful ones from the same
/// environment that started before the target are candidates, and the most
/// recent of those wins.
pub fn plan_rollback(
    target: &Deployment,
    history: &[Deployment],
    performed_by: &str,
) -> Result<NewDeployment, DbError> {
    if target.status == DeploymentStatus::RolledBack {
        return Err(DbError::Conflict(format!("deployment {} is already rolled back", target.id)));
    }

    let previous = history
        .iter()
        .filter(|d| {
            d.id != target.id
                && d.environment == target.environment
                && d.status == DeploymentStatus::Success
                && d.started_at < target.started_at
        })
        .max_by_key(|d| d.started_at)
        .ok_or_else(|| {
            DbError::Conflict(format!(
                "no earlier successful deployment in {} to roll back to",
                target.environment
            ))
        })?;

    Ok(NewDeployment {
        environment: target.environment.clone(),
        version: previous.version.clone(),
        status: DeploymentStatus::Success,
        deployed_by: performed_by.to_string(),
        commit_sha: previous.commit_sha.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn deployment(env: &str, version: &str, status: DeploymentStatus, minutes_ago: i64) -> Deployment {
        Deployment {
            id: Uuid::new_v4(),
            environment: env.to_string(),
            version: version.to_string(),
            status,
            deployed_by: "ci".to_string(),
            commit_sha: Some(format!("sha-{}", version)),
            started_at: Utc::now() - Duration::minutes(minutes_ago),
            completed_at: None,
            rollback_of: None,
        }
    }

    #[test]
    fn restores_latest_earlier_success() {
        let older = deployment("production", "1.0.0", DeploymentStatus::Success, 30);
        let prev = deployment("production", "1.1.0", DeploymentStatus::Success, 20);
        let failed = deployment("production", "1.1.5", DeploymentStatus::Failed, 15);
        let staging = deployment("staging", "1.2.0-rc", DeploymentStatus::Success, 12);
        let target = deployment("production", "1.2.0", DeploymentStatus::Success, 10);

        let history = vec![older, prev, failed, staging, target.clone()];
        let plan = plan_rollback(&target, &history, "alice").unwrap();

        assert_eq!(plan.version, "1.1.0");
        assert_eq!(plan.environment, "production");
        assert_eq!(plan.deployed_by, "alice");
        assert_eq!(plan.commit_sha.as_deref(), Some("sha-1.1.0"));
        assert_eq!(plan.status, DeploymentStatus::Success);
    }

    #[test]
    fn refuses_double_rollback() {
        let prev = deployment("production", "1.0.0", DeploymentStatus::Success, 20);
        let target = deployment("production", "1.1.0", DeploymentStatus::RolledBack, 10);
        let err = plan_rollback(&target, &[prev], "alice").unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn nothing_to_restore() {
        let later = deployment("production", "2.0.0", DeploymentStatus::Success, 1);
        let target = deployment("production", "1.0.0", DeploymentStatus::Success, 10);
        let err = plan_rollback(&target, &[later], "alice").unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }
}
