use std::hash::{DefaultHasher, Hash, Hasher};

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    BillStatus, Card, CardSummary, EngineError, MoneyCents, ResultEngine, bills,
    cache::scoped_key,
    cards::{self, DEFAULT_CARD_COLOR, DEFAULT_CLOSING_DAY, DEFAULT_DUE_DAY, normalize_last4},
    transactions,
    util::is_hex_color,
};

use super::{
    Engine, normalize_optional_text, normalize_required_name, transactions::UsageDeltas, with_tx,
};

mod statements;
mod payment;

pub use statements::{BillSummary, CardBillsForMonth};
pub use payment::{BillPayment, CurrentBillPayment};

use statements::{CardLedger, card_bills, current_bill};

const DEFAULT_NETWORK: &str = "Outro";
const DETAIL_BILLS: usize = 12;

/// Create (`id == None`) or edit payload of a card.
///
/// Edits carrying `version` only apply when it still matches the stored one.
#[derive(Clone, Debug)]
pub struct CardCmd {
    pub id: Option<Uuid>,
    pub name: String,
    pub issuer: Option<String>,
    pub network: Option<String>,
    pub last4: Option<String>,
    pub color: Option<String>,
    pub total_limit: MoneyCents,
    pub closing_day: Option<u32>,
    pub due_day: Option<u32>,
    pub version: Option<i64>,
}

impl CardCmd {
    #[must_use]
    pub fn new(name: impl Into<String>, total_limit: MoneyCents) -> Self {
        Self {
            id: None,
            name: name.into(),
            issuer: None,
            network: None,
            last4: None,
            color: None,
            total_limit,
            closing_day: None,
            due_day: None,
            version: None,
        }
    }

    #[must_use]
    pub fn days(mut self, closing_day: u32, due_day: u32) -> Self {
        self.closing_day = Some(closing_day);
        self.due_day = Some(due_day);
        self
    }

    #[must_use]
    pub fn edit(mut self, id: Uuid, version: i64) -> Self {
        self.id = Some(id);
        self.version = Some(version);
        self
    }
}

/// Enriched cards plus the etag of the answer. When the caller already holds
/// the current etag, `unchanged` is set and `cards` is empty.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardList {
    pub etag: String,
    pub unchanged: bool,
    pub cards: Vec<CardSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetail {
    pub card: CardSummary,
    /// Statement open today, synthesized when no bill row exists yet.
    pub current_bill: BillSummary,
    /// Latest bills, newest first.
    pub bills: Vec<BillSummary>,
    pub bill_count: usize,
    pub open_amount: MoneyCents,
    pub paid_count: usize,
}

/// Aggregate card figures of the dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardKpis {
    pub active_cards: usize,
    pub total_limit: MoneyCents,
    pub used: MoneyCents,
    pub available: MoneyCents,
    /// Outstanding value of every unpaid bill.
    pub open_bills: MoneyCents,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRemoval {
    pub card_id: Uuid,
    pub bills_deleted: u64,
    pub transactions_deleted: u64,
}

pub(super) async fn require_card<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
    id: Uuid,
) -> ResultEngine<Card> {
    let model = cards::Entity::find_by_id(id)
        .filter(cards::Column::UserId.eq(user_id))
        .one(db)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("card {id}")))?;
    Card::try_from(model)
}

async fn user_cards<C: ConnectionTrait>(db: &C, user_id: &str) -> ResultEngine<Vec<Card>> {
    cards::Entity::find()
        .filter(cards::Column::UserId.eq(user_id))
        .order_by_desc(cards::Column::Active)
        .order_by_asc(cards::Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(Card::try_from)
        .collect()
}

fn validate_day(day: Option<u32>, fallback: u32, label: &str) -> ResultEngine<u32> {
    match day {
        None => Ok(fallback),
        Some(day @ 1..=31) => Ok(day),
        Some(day) => Err(EngineError::InvalidInput(format!(
            "{label} day must be between 1 and 31, got {day}"
        ))),
    }
}

fn card_etag(cards: &[CardSummary], today: NaiveDate) -> String {
    let mut hasher = DefaultHasher::new();
    today.hash(&mut hasher);
    for summary in cards {
        let card = &summary.card;
        card.id.hash(&mut hasher);
        card.version.hash(&mut hasher);
        card.used_limit.hash(&mut hasher);
        card.total_limit.hash(&mut hasher);
        card.active.hash(&mut hasher);
        card.updated_at.timestamp_micros().hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

impl Engine {
    /// Adds each net delta to its card's used limit (never below zero) and
    /// bumps the card version.
    pub(super) async fn apply_card_usage<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: &str,
        deltas: &UsageDeltas,
    ) -> ResultEngine<()> {
        for (card_id, delta) in deltas.iter() {
            let Some(model) = cards::Entity::find_by_id(card_id)
                .filter(cards::Column::UserId.eq(user_id))
                .one(db)
                .await?
            else {
                tracing::warn!(user_id, %card_id, "usage change for a missing card ignored");
                continue;
            };
            let used = (MoneyCents::new(model.used_limit_cents) + delta).non_negative();
            let version = model.version;
            let mut active: cards::ActiveModel = model.into();
            active.used_limit_cents = ActiveValue::Set(used.cents());
            active.version = ActiveValue::Set(version + 1);
            active.updated_at = ActiveValue::Set(Utc::now());
            active.update(db).await?;
            tracing::debug!(user_id, %card_id, %delta, %used, "card usage adjusted");
        }
        Ok(())
    }

    pub async fn card(&self, user_id: &str, id: Uuid) -> ResultEngine<Card> {
        require_card(&self.database, user_id, id).await
    }

    /// Enriched cards of `user_id`. Passing the etag of a previous answer
    /// returns `unchanged` when nothing moved since.
    pub async fn list_cards(&self, user_id: &str, etag: Option<&str>) -> ResultEngine<CardList> {
        let list = match self.caches.cards.get(user_id) {
            Some(list) => list,
            None => {
                let today = self.today(user_id).await?;
                let cards: Vec<CardSummary> = user_cards(&self.database, user_id)
                    .await?
                    .iter()
                    .map(|card| card.summarize(today))
                    .collect();
                let list = CardList {
                    etag: card_etag(&cards, today),
                    unchanged: false,
                    cards,
                };
                self.caches.cards.set(user_id.to_string(), list.clone());
                list
            }
        };
        if etag.is_some_and(|etag| etag == list.etag) {
            return Ok(CardList {
                etag: list.etag,
                unchanged: true,
                cards: Vec::new(),
            });
        }
        Ok(list)
    }

    /// Card with its bills valued from the ledger.
    pub async fn card_detail(&self, user_id: &str, card_id: Uuid) -> ResultEngine<CardDetail> {
        let key = scoped_key(user_id, card_id);
        if let Some(detail) = self.caches.card_details.get(&key) {
            return Ok(detail);
        }
        let today = self.today(user_id).await?;
        let card = require_card(&self.database, user_id, card_id).await?;
        let ledger = CardLedger::load(&self.database, user_id, card_id).await?;
        let bills = card_bills(&self.database, user_id, card_id).await?;

        let mut summaries = BillSummary::running(&bills, &ledger);
        let open_amount = summaries
            .iter()
            .filter(|s| s.value.status != BillStatus::Paid)
            .map(|s| s.value.remaining)
            .sum();
        let paid_count = summaries
            .iter()
            .filter(|s| s.value.status == BillStatus::Paid)
            .count();
        let bill_count = summaries.len();
        summaries.reverse();
        summaries.truncate(DETAIL_BILLS);

        let detail = CardDetail {
            current_bill: current_bill(&card, &ledger, &bills, today),
            card: card.summarize(today),
            bills: summaries,
            bill_count,
            open_amount,
            paid_count,
        };
        self.caches.card_details.set(key, detail.clone());
        Ok(detail)
    }

    /// Creates a card, or edits one with an atomic version check.
    pub async fn save_card(&self, user_id: &str, cmd: CardCmd) -> ResultEngine<Card> {
        let name = normalize_required_name(&cmd.name, "card")?;
        if cmd.total_limit.is_negative() {
            return Err(EngineError::InvalidAmount(
                "limit must not be negative".to_string(),
            ));
        }
        let closing_day = validate_day(cmd.closing_day, DEFAULT_CLOSING_DAY, "closing")?;
        let due_day = validate_day(cmd.due_day, DEFAULT_DUE_DAY, "due")?;
        let color = match normalize_optional_text(cmd.color.as_deref()) {
            None => DEFAULT_CARD_COLOR.to_string(),
            Some(color) if is_hex_color(&color) => color.to_uppercase(),
            Some(_) => {
                return Err(EngineError::InvalidInput(
                    "color must be #RRGGBB".to_string(),
                ));
            }
        };
        let issuer = normalize_optional_text(cmd.issuer.as_deref());
        let network = normalize_optional_text(cmd.network.as_deref())
            .unwrap_or_else(|| DEFAULT_NETWORK.to_string());
        let last4 = cmd.last4.as_deref().and_then(normalize_last4);

        let _guard = self.lock_cards().await?;
        let card = with_tx!(self, |db_tx| {
            let now = Utc::now();
            let id = match cmd.id {
                None => {
                    let card = Card {
                        id: Uuid::new_v4(),
                        user_id: user_id.to_string(),
                        name,
                        issuer,
                        network,
                        last4,
                        color,
                        total_limit: cmd.total_limit,
                        used_limit: MoneyCents::ZERO,
                        closing_day,
                        due_day,
                        active: true,
                        created_at: now,
                        updated_at: now,
                        version: 1,
                    };
                    cards::ActiveModel::from(&card).insert(&db_tx).await?;
                    card.id
                }
                Some(id) => {
                    let mut update = cards::Entity::update_many()
                        .col_expr(cards::Column::Name, Expr::value(name))
                        .col_expr(cards::Column::Issuer, Expr::value(issuer))
                        .col_expr(cards::Column::Network, Expr::value(network))
                        .col_expr(cards::Column::Last4, Expr::value(last4))
                        .col_expr(cards::Column::Color, Expr::value(color))
                        .col_expr(
                            cards::Column::TotalLimitCents,
                            Expr::value(cmd.total_limit.cents()),
                        )
                        .col_expr(cards::Column::ClosingDay, Expr::value(closing_day as i32))
                        .col_expr(cards::Column::DueDay, Expr::value(due_day as i32))
                        .col_expr(cards::Column::UpdatedAt, Expr::value(now))
                        .col_expr(
                            cards::Column::Version,
                            Expr::col(cards::Column::Version).add(1),
                        )
                        .filter(cards::Column::Id.eq(id))
                        .filter(cards::Column::UserId.eq(user_id));
                    if let Some(expected) = cmd.version {
                        update = update.filter(cards::Column::Version.eq(expected));
                    }
                    let result = update.exec(&db_tx).await?;
                    if result.rows_affected == 0 {
                        let current = require_card(&db_tx, user_id, id).await?;
                        return Err(EngineError::VersionConflict {
                            expected: cmd.version.unwrap_or_default(),
                            current: current.version,
                        });
                    }
                    id
                }
            };
            require_card(&db_tx, user_id, id).await
        })?;

        self.invalidate_card_caches(user_id);
        tracing::debug!(user_id, id = %card.id, version = card.version, "card saved");
        Ok(card)
    }

    /// Archives (`active = false`) or restores a card.
    pub async fn archive_card(&self, user_id: &str, id: Uuid, active: bool) -> ResultEngine<Card> {
        let _guard = self.lock_cards().await?;
        let card = with_tx!(self, |db_tx| {
            let mut card = require_card(&db_tx, user_id, id).await?;
            card.active = active;
            card.version += 1;
            card.updated_at = Utc::now();
            cards::ActiveModel::from(&card).update(&db_tx).await?;
            Ok::<_, EngineError>(card)
        })?;
        self.invalidate_card_caches(user_id);
        Ok(card)
    }

    /// Deletes a card together with its bills and every ledger row charged
    /// on it or settling one of its bills, in one database transaction.
    pub async fn delete_card_cascade(
        &self,
        user_id: &str,
        card_id: Uuid,
    ) -> ResultEngine<CardRemoval> {
        let today = self.today(user_id).await?;
        let _guard = self.lock_cards().await?;
        let removal = with_tx!(self, |db_tx| {
            require_card(&db_tx, user_id, card_id).await?;
            let transactions_deleted = transactions::Entity::delete_many()
                .filter(transactions::Column::UserId.eq(user_id))
                .filter(transactions::Column::CardId.eq(card_id))
                .exec(&db_tx)
                .await?
                .rows_affected;
            let bills_deleted = bills::Entity::delete_many()
                .filter(bills::Column::UserId.eq(user_id))
                .filter(bills::Column::CardId.eq(card_id))
                .exec(&db_tx)
                .await?
                .rows_affected;
            cards::Entity::delete_by_id(card_id).exec(&db_tx).await?;
            self.rebuild_reserves(&db_tx, user_id, today).await?;
            Ok::<_, EngineError>(CardRemoval {
                card_id,
                bills_deleted,
                transactions_deleted,
            })
        })?;

        self.invalidate_card_caches(user_id);
        self.invalidate_account_caches(user_id);
        tracing::info!(
            user_id,
            %card_id,
            bills = removal.bills_deleted,
            transactions = removal.transactions_deleted,
            "card deleted"
        );
        Ok(removal)
    }

    /// Aggregate figures over the active cards of `user_id`.
    pub(super) async fn card_kpis<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: &str,
    ) -> ResultEngine<CardKpis> {
        let mut kpis = CardKpis::default();
        for card in user_cards(db, user_id).await?.iter().filter(|c| c.active) {
            kpis.active_cards += 1;
            kpis.total_limit += card.total_limit;
            kpis.used += card.used_limit;
            kpis.available += card.available();

            let ledger = CardLedger::load(db, user_id, card.id).await?;
            kpis.open_bills += card_bills(db, user_id, card.id)
                .await?
                .iter()
                .map(|bill| ledger.bill_value(bill))
                .filter(|value| value.status != BillStatus::Paid)
                .map(|value| value.remaining)
                .sum();
        }
        Ok(kpis)
    }
}
