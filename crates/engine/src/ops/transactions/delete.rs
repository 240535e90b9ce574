use sea_orm::{PaginatorTrait, QueryFilter, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, installment_groups, transactions};

use super::super::{Engine, with_tx};
use super::{BatchScope, UsageDeltas, find_transaction, scoped_rows};

impl Engine {
    /// Hard-deletes the row `id` (and, depending on `scope`, its group
    /// siblings), reversing their card usage. Returns the deleted count.
    pub async fn delete_transaction(
        &self,
        user_id: &str,
        id: Uuid,
        scope: BatchScope,
    ) -> ResultEngine<usize> {
        let today = self.today(user_id).await?;

        let count = with_tx!(self, |db_tx| {
            let anchor = find_transaction(&db_tx, user_id, id).await?;
            let rows = scoped_rows(&db_tx, user_id, &anchor, scope).await?;

            let mut deltas = UsageDeltas::default();
            for row in &rows {
                deltas.reverse(row.card_usage());
            }
            let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
            transactions::Entity::delete_many()
                .filter(transactions::Column::UserId.eq(user_id))
                .filter(transactions::Column::Id.is_in(ids))
                .exec(&db_tx)
                .await?;
            self.apply_card_usage(&db_tx, user_id, &deltas).await?;

            if let Some(group_id) = anchor.group_id {
                let remaining = transactions::Entity::find()
                    .filter(transactions::Column::UserId.eq(user_id))
                    .filter(transactions::Column::GroupId.eq(group_id))
                    .count(&db_tx)
                    .await?;
                if remaining == 0 {
                    installment_groups::Entity::delete_many()
                        .filter(installment_groups::Column::UserId.eq(user_id))
                        .filter(installment_groups::Column::Id.eq(group_id))
                        .exec(&db_tx)
                        .await?;
                }
            }

            self.rebuild_reserves(&db_tx, user_id, today).await?;
            Ok::<_, EngineError>(rows.len())
        })?;

        self.invalidate_card_caches(user_id);
        self.invalidate_account_caches(user_id);
        tracing::debug!(user_id, %id, ?scope, count, "transactions deleted");
        Ok(count)
    }
}
