//! Reward and carbon ledger.
//!
//! Verification transitions award points, badges, and carbon credits inside
//! one transaction, guarded by the entity's `awarded` flag so repeat
//! verifications are no-ops. Ledger entries are append-only; balances are
//! derived sums and must always reconcile against the ledger.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Transaction};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::db::Database;
use crate::types::{MsituError, Result};

/// Carbon credit price shown to users, KES per tonne CO2.
const CARBON_PRICE_KES: f64 = 300.0;

/// Tonnes CO2 credited per verified tree.
const CARBON_PER_TREE: f64 = 0.025;

const INITIATIVE_BADGE: &str = "15 Billion Trees Initiative Participant";

const FUND_PROJECTS: [&str; 3] = [
    "Mau Forest Restoration",
    "Lake Victoria Cleanup",
    "Maasai Mara Conservation",
];

/// Who is acting on an entity.
#[derive(Debug, Clone)]
pub struct Actor {
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Organization,
    Member,
}

impl Actor {
    pub fn admin(name: &str) -> Self {
        Actor {
            name: name.to_string(),
            role: Role::Admin,
        }
    }

    pub fn organization(name: &str) -> Self {
        Actor {
            name: name.to_string(),
            role: Role::Organization,
        }
    }

    pub fn member(name: &str) -> Self {
        Actor {
            name: name.to_string(),
            role: Role::Member,
        }
    }
}

/// Outcome of a verification transition.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub awarded_now: bool,
    pub points: i64,
    pub carbon_tonnes: f64,
    pub badges_added: Vec<String>,
}

/// Marketplace transaction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Sell,
    Fund,
}

/// Outcome of a marketplace transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResult {
    pub transaction_type: String,
    pub amount: f64,
    pub value_kes: f64,
    pub description: String,
    pub new_balance: f64,
}

/// Derived per-user balances.
#[derive(Debug, Clone, Serialize)]
pub struct UserBalances {
    pub user: String,
    pub points: i64,
    pub total_points_earned: i64,
    pub badges: Vec<String>,
    pub carbon_balance: f64,
    pub total_carbon_earned: f64,
    pub carbon_value_kes: f64,
}

/// Badge tier for a single verified planting.
fn badge_for_trees(count: u32) -> &'static str {
    if count >= 50 {
        "Forest Hero"
    } else if count >= 20 {
        "Tree Champion"
    } else if count >= 10 {
        "Green Warrior"
    } else if count >= 5 {
        "Eco Defender"
    } else {
        "Nature Friend"
    }
}

fn require_verifier(actor: &Actor) -> Result<()> {
    match actor.role {
        Role::Admin | Role::Organization => Ok(()),
        Role::Member => Err(MsituError::Unauthorized(format!(
            "{} may not verify entities",
            actor.name
        ))),
    }
}

/// Ledger writer. All award and spend paths funnel through here.
pub struct Ledger {
    db: Arc<Database>,
}

impl Ledger {
    pub fn new(db: Arc<Database>) -> Self {
        Ledger { db }
    }

    /// Verify a tree planting and atomically award points, badges, and
    /// carbon credits. Idempotent: an already-awarded planting returns
    /// success with `awarded_now = false` and no new ledger rows.
    pub async fn verify_tree(&self, tree_id: i64, actor: &Actor) -> Result<VerificationResult> {
        require_verifier(actor)?;

        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        let row: Option<(String, u32, String, bool)> = tx
            .query_row(
                "SELECT planter, number_of_trees, status, awarded
                 FROM tree_plantings WHERE id = ?1",
                params![tree_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get::<_, i64>(3)? != 0,
                    ))
                },
            )
            .optional()?;

        let Some((planter, trees, _status, awarded)) = row else {
            return Err(MsituError::Validation(format!(
                "tree planting {tree_id} not found"
            )));
        };

        if awarded {
            tx.commit()?;
            return Ok(VerificationResult {
                awarded_now: false,
                points: 0,
                carbon_tonnes: 0.0,
                badges_added: Vec::new(),
            });
        }

        // First verified planting by this user earns the initiative badge.
        let prior_verified: i64 = tx.query_row(
            "SELECT COUNT(*) FROM tree_plantings WHERE planter = ?1 AND awarded = 1",
            params![planter],
            |row| row.get(0),
        )?;

        let points = i64::from(trees) * 2;
        let carbon = f64::from(trees) * CARBON_PER_TREE;

        append_entry(
            &tx,
            &planter,
            "points",
            points as f64,
            &format!("Tree planting: {trees} trees"),
            Some(("tree_planting", tree_id)),
        )?;
        append_entry(
            &tx,
            &planter,
            "carbon",
            carbon,
            &format!("Carbon credits from {trees} verified trees"),
            Some(("tree_planting", tree_id)),
        )?;
        credit_balances(&tx, &planter, points, carbon)?;

        let mut badges_added = vec![badge_for_trees(trees).to_string()];
        if prior_verified == 0 {
            badges_added.push(INITIATIVE_BADGE.to_string());
        }
        let badges_added = add_badges(&tx, &planter, &badges_added)?;

        tx.execute(
            "UPDATE tree_plantings SET status = 'verified', awarded = 1 WHERE id = ?1",
            params![tree_id],
        )?;

        // Organizations are paid a small per-verification fee.
        if actor.role == Role::Organization {
            append_entry(
                &tx,
                &actor.name,
                "points",
                5.0,
                &format!("Tree verification payment: planting {tree_id}"),
                Some(("tree_planting", tree_id)),
            )?;
            credit_balances(&tx, &actor.name, 5, 0.0)?;
        }

        tx.commit()?;

        info!(
            tree_id,
            planter = %planter,
            points,
            carbon,
            "Tree planting verified and awarded"
        );
        Ok(VerificationResult {
            awarded_now: true,
            points,
            carbon_tonnes: carbon,
            badges_added,
        })
    }

    /// Verify an environmental report: 1 point and 0.001 t CO2, same
    /// idempotency discipline as tree verification.
    pub async fn verify_report(&self, report_id: i64, actor: &Actor) -> Result<VerificationResult> {
        require_verifier(actor)?;

        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        let row: Option<(String, String, bool)> = tx
            .query_row(
                "SELECT reporter, title, awarded FROM reports WHERE id = ?1",
                params![report_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get::<_, i64>(2)? != 0)),
            )
            .optional()?;

        let Some((reporter, title, awarded)) = row else {
            return Err(MsituError::Validation(format!(
                "report {report_id} not found"
            )));
        };

        if awarded {
            tx.commit()?;
            return Ok(VerificationResult {
                awarded_now: false,
                points: 0,
                carbon_tonnes: 0.0,
                badges_added: Vec::new(),
            });
        }

        append_entry(
            &tx,
            &reporter,
            "points",
            1.0,
            &format!("Environmental report: {title}"),
            Some(("report", report_id)),
        )?;
        append_entry(
            &tx,
            &reporter,
            "carbon",
            0.001,
            &format!("Environmental monitoring: {title}"),
            Some(("report", report_id)),
        )?;
        credit_balances(&tx, &reporter, 1, 0.001)?;

        tx.execute(
            "UPDATE reports SET status = 'verified', awarded = 1 WHERE id = ?1",
            params![report_id],
        )?;

        if actor.role == Role::Organization {
            append_entry(
                &tx,
                &actor.name,
                "points",
                5.0,
                &format!("Report verification payment: report {report_id}"),
                Some(("report", report_id)),
            )?;
            credit_balances(&tx, &actor.name, 5, 0.0)?;
        }

        tx.commit()?;

        info!(report_id, reporter = %reporter, "Report verified and awarded");
        Ok(VerificationResult {
            awarded_now: true,
            points: 1,
            carbon_tonnes: 0.001,
            badges_added: Vec::new(),
        })
    }

    /// Marketplace debit: sell credits or fund a project. Fails closed when
    /// the balance is insufficient; no partial applies.
    pub async fn transact(
        &self,
        user: &str,
        kind: TransactionType,
        amount: f64,
    ) -> Result<TransactionResult> {
        if amount <= 0.0 || !amount.is_finite() {
            return Err(MsituError::Validation(
                "transaction amount must be positive".to_string(),
            ));
        }

        let mut conn = self.db.lock().await;
        let tx = conn.transaction()?;

        let balance: f64 = tx
            .query_row(
                "SELECT carbon_balance FROM balances WHERE user = ?1",
                params![user],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0.0);

        if amount > balance + 1e-9 {
            return Err(MsituError::InsufficientBalance {
                needed: amount,
                available: balance,
            });
        }

        let mut new_balance = balance - amount;
        if new_balance.abs() < 1e-9 {
            new_balance = 0.0;
        }
        let value_kes = amount * CARBON_PRICE_KES;

        let (type_name, description) = match kind {
            TransactionType::Sell => (
                "sell",
                format!("Sold {amount}t CO2 credits to verified buyers"),
            ),
            TransactionType::Fund => {
                let project = fund_project_for(user);
                ("fund", format!("Funded {project} project with {amount}t CO2 credits"))
            }
        };

        append_entry(&tx, user, "carbon", -amount, &description, None)?;
        tx.execute(
            "UPDATE balances SET carbon_balance = ?2, carbon_value_kes = ?3 WHERE user = ?1",
            params![user, new_balance, new_balance * CARBON_PRICE_KES],
        )?;

        tx.commit()?;

        info!(user, kind = type_name, amount, new_balance, "Carbon transaction applied");
        Ok(TransactionResult {
            transaction_type: type_name.to_string(),
            amount,
            value_kes,
            description,
            new_balance,
        })
    }

    /// Current derived balances for a user.
    pub async fn balances(&self, user: &str) -> Result<UserBalances> {
        let conn = self.db.lock().await;
        let row: Option<(i64, i64, String, f64, f64, f64)> = conn
            .query_row(
                "SELECT points, total_points_earned, badges, carbon_balance,
                        total_carbon_earned, carbon_value_kes
                 FROM balances WHERE user = ?1",
                params![user],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;

        let (points, total_points, badges_json, carbon, total_carbon, value) =
            row.unwrap_or((0, 0, "[]".to_string(), 0.0, 0.0, 0.0));
        Ok(UserBalances {
            user: user.to_string(),
            points,
            total_points_earned: total_points,
            badges: serde_json::from_str(&badges_json).unwrap_or_default(),
            carbon_balance: carbon,
            total_carbon_earned: total_carbon,
            carbon_value_kes: value,
        })
    }

    /// Check the derived balances against the ledger sums.
    pub async fn ledger_reconciles(&self, user: &str) -> Result<bool> {
        let balances = self.balances(user).await?;
        let conn = self.db.lock().await;

        let point_sum: f64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM ledger_entries
             WHERE user = ?1 AND kind = 'points'",
            params![user],
            |row| row.get(0),
        )?;
        let carbon_sum: f64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM ledger_entries
             WHERE user = ?1 AND kind = 'carbon'",
            params![user],
            |row| row.get(0),
        )?;

        Ok((point_sum - balances.points as f64).abs() < 1e-9
            && (carbon_sum - balances.carbon_balance).abs() < 1e-9)
    }
}

/// Deterministic project pick: stable hash of the user id over the fixed
/// list, so repeat calls land on the same project.
fn fund_project_for(user: &str) -> &'static str {
    let digest = Sha256::digest(user.as_bytes());
    let index = (digest[0] as usize) % FUND_PROJECTS.len();
    FUND_PROJECTS[index]
}

fn append_entry(
    tx: &Transaction<'_>,
    user: &str,
    kind: &str,
    amount: f64,
    description: &str,
    entity: Option<(&str, i64)>,
) -> Result<()> {
    let (entity_kind, entity_id) = match entity {
        Some((kind, id)) => (Some(kind), Some(id)),
        None => (None, None),
    };
    tx.execute(
        "INSERT INTO ledger_entries (user, kind, amount, description, entity_kind, entity_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![user, kind, amount, description, entity_kind, entity_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

fn credit_balances(tx: &Transaction<'_>, user: &str, points: i64, carbon: f64) -> Result<()> {
    tx.execute(
        "INSERT INTO balances (user, points, total_points_earned, badges, carbon_balance,
                               total_carbon_earned, carbon_value_kes)
         VALUES (?1, ?2, ?2, '[]', ?3, ?3, ?4)
         ON CONFLICT(user) DO UPDATE SET
            points = points + excluded.points,
            total_points_earned = total_points_earned + excluded.total_points_earned,
            carbon_balance = carbon_balance + excluded.carbon_balance,
            total_carbon_earned = total_carbon_earned + excluded.total_carbon_earned,
            carbon_value_kes = (carbon_balance + excluded.carbon_balance) * ?5",
        params![user, points, carbon, carbon * CARBON_PRICE_KES, CARBON_PRICE_KES],
    )?;
    Ok(())
}

fn add_badges(tx: &Transaction<'_>, user: &str, badges: &[String]) -> Result<Vec<String>> {
    let current_json: Option<String> = tx
        .query_row(
            "SELECT badges FROM balances WHERE user = ?1",
            params![user],
            |row| row.get(0),
        )
        .optional()?;
    let mut current: Vec<String> = current_json
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    let mut added = Vec::new();
    for badge in badges {
        if !current.contains(badge) {
            current.push(badge.clone());
            added.push(badge.clone());
        }
    }
    tx.execute(
        "UPDATE balances SET badges = ?2 WHERE user = ?1",
        params![user, serde_json::to_string(&current).unwrap_or_else(|_| "[]".into())],
    )?;
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_tiers() {
        assert_eq!(badge_for_trees(60), "Forest Hero");
        assert_eq!(badge_for_trees(50), "Forest Hero");
        assert_eq!(badge_for_trees(20), "Tree Champion");
        assert_eq!(badge_for_trees(12), "Green Warrior");
        assert_eq!(badge_for_trees(5), "Eco Defender");
        assert_eq!(badge_for_trees(1), "Nature Friend");
    }

    #[test]
    fn test_fund_project_is_stable() {
        assert_eq!(fund_project_for("amina"), fund_project_for("amina"));
        assert!(FUND_PROJECTS.contains(&fund_project_for("someone-else")));
    }

    #[test]
    fn test_member_cannot_verify() {
        assert!(require_verifier(&Actor::member("eve")).is_err());
        assert!(require_verifier(&Actor::admin("root")).is_ok());
        assert!(require_verifier(&Actor::organization("green-org")).is_ok());
    }
}
