use chrono::NaiveDate;
use sea_orm::{Database, DatabaseConnection};

use engine::{
    BatchScope, CategoryCmd, CategoryScope, Engine, EngineError, INVESTMENTS_ACCOUNT_NAME,
    MoneyCents, MonthKey, NewTransaction, PaymentStatus, TransactionKind, TransactionListFilter,
    TransactionPatch, Updated, WALLET_ACCOUNT_NAME,
};
use migration::MigratorTrait;
use uuid::Uuid;

const USER: &str = "alice";

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn cents(value: i64) -> MoneyCents {
    MoneyCents::new(value)
}

struct Ledger {
    engine: Engine,
    _db: DatabaseConnection,
    wallet: Uuid,
    investments: Uuid,
    expense: Uuid,
    income: Uuid,
}

async fn ledger() -> Ledger {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .today(date(2025, 3, 15))
        .build()
        .await
        .unwrap();
    engine.bootstrap_user(USER).await.unwrap();

    let accounts = engine.list_accounts(USER, false).await.unwrap();
    let account = |name: &str| {
        accounts
            .iter()
            .find(|a| a.account.name == name)
            .map(|a| a.account.id)
            .unwrap()
    };
    let categories = engine.list_categories(USER, false).await.unwrap();
    let category = |name: &str| categories.iter().find(|c| c.name == name).unwrap().id;

    Ledger {
        wallet: account(WALLET_ACCOUNT_NAME),
        investments: account(INVESTMENTS_ACCOUNT_NAME),
        expense: category("Outros"),
        income: category("Ganhos"),
        engine,
        _db: db,
    }
}

#[tokio::test]
async fn bootstrap_is_idempotent() {
    let l = ledger().await;
    l.engine.bootstrap_user(USER).await.unwrap();

    let accounts = l.engine.list_accounts(USER, true).await.unwrap();
    assert_eq!(accounts.len(), 2);
    let categories = l.engine.list_categories(USER, true).await.unwrap();
    assert_eq!(
        categories.iter().filter(|c| c.name == "Outros").count(),
        1
    );
}

#[tokio::test]
async fn balance_replays_settled_rows() {
    let l = ledger().await;
    let e = &l.engine;

    e.create_transaction(
        USER,
        NewTransaction::new(date(2025, 3, 1), TransactionKind::Income, cents(1000_00), "Salário")
            .category(l.income)
            .to_account(l.wallet),
    )
    .await
    .unwrap();
    let groceries = e
        .create_transaction(
            USER,
            NewTransaction::new(date(2025, 3, 5), TransactionKind::Expense, cents(300_00), "Mercado")
                .category(l.expense)
                .from_account(l.wallet),
        )
        .await
        .unwrap();
    // Dated after today, so it starts pending and does not move the balance.
    let rent = e
        .create_transaction(
            USER,
            NewTransaction::new(date(2025, 3, 20), TransactionKind::Expense, cents(200_00), "Aluguel")
                .category(l.expense)
                .from_account(l.wallet),
        )
        .await
        .unwrap();
    e.create_transaction(
        USER,
        NewTransaction::new(date(2025, 3, 10), TransactionKind::Transfer, cents(100_00), "Reserva")
            .from_account(l.wallet)
            .to_account(l.investments),
    )
    .await
    .unwrap();

    assert_eq!(e.account_balance(USER, l.wallet).await.unwrap(), cents(600_00));
    assert_eq!(e.account_balance(USER, l.investments).await.unwrap(), cents(100_00));

    e.delete_transaction(USER, groceries.id, BatchScope::This)
        .await
        .unwrap();
    assert_eq!(e.account_balance(USER, l.wallet).await.unwrap(), cents(900_00));

    let patch = TransactionPatch {
        paid: Some(true),
        ..Default::default()
    };
    e.update_transaction(USER, rent.id, patch, BatchScope::This)
        .await
        .unwrap();
    assert_eq!(e.account_balance(USER, l.wallet).await.unwrap(), cents(700_00));

    let listed = e.list_accounts(USER, false).await.unwrap();
    let wallet = listed.iter().find(|a| a.account.id == l.wallet).unwrap();
    assert_eq!(wallet.balance, cents(700_00));
}

#[tokio::test]
async fn future_transfers_wait_until_paid() {
    let l = ledger().await;
    let e = &l.engine;
    let transfer = |day| {
        NewTransaction::new(day, TransactionKind::Transfer, cents(80_00), "Reserva")
            .from_account(l.wallet)
            .to_account(l.investments)
    };

    let done = e.create_transaction(USER, transfer(date(2025, 3, 1))).await.unwrap();
    let done = e.transaction(USER, done.id).await.unwrap();
    assert_eq!(done.payment_status, Some(PaymentStatus::Paid));
    assert_eq!(done.payment_date, Some(date(2025, 3, 1)));

    let scheduled = e.create_transaction(USER, transfer(date(2025, 4, 1))).await.unwrap();
    let scheduled = e.transaction(USER, scheduled.id).await.unwrap();
    assert_eq!(scheduled.payment_status, Some(PaymentStatus::Pending));
    assert_eq!(scheduled.payment_date, None);
    assert_eq!(scheduled.reconciliation_date, None);
    assert_eq!(e.account_balance(USER, l.investments).await.unwrap(), cents(80_00));

    let early = e
        .create_transaction(USER, transfer(date(2025, 4, 2)).paid(true))
        .await
        .unwrap();
    let early = e.transaction(USER, early.id).await.unwrap();
    assert_eq!(early.payment_date, Some(date(2025, 4, 2)));
    assert_eq!(e.account_balance(USER, l.investments).await.unwrap(), cents(160_00));
}

#[tokio::test]
async fn create_list_update_delete_round_trip() {
    let l = ledger().await;
    let e = &l.engine;
    let march = MonthKey::new(2025, 3).unwrap();

    let created = e
        .create_transaction(
            USER,
            NewTransaction::new(date(2025, 3, 2), TransactionKind::Expense, cents(50_00), "Mercado")
                .category(l.expense)
                .from_account(l.wallet),
        )
        .await
        .unwrap();

    let page = e
        .list_transactions(USER, &TransactionListFilter::new(march))
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    let item = &page.items[0];
    assert_eq!(item.transaction.id, created.id);
    assert_eq!(item.transaction.category_name.as_deref(), Some("Outros"));
    assert!(item.is_paid);

    let patch = TransactionPatch {
        description: Some("Feira".to_string()),
        amount: Some(cents(60_00)),
        ..Default::default()
    };
    let updated = e
        .update_transaction(USER, created.id, patch, BatchScope::This)
        .await
        .unwrap();
    assert_eq!(updated, Updated::One { id: created.id });

    let mut filter = TransactionListFilter::new(march);
    filter.search = Some("feira".to_string());
    let page = e.list_transactions(USER, &filter).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].transaction.description, "Feira");
    assert_eq!(page.items[0].transaction.amount, cents(60_00));
    assert_eq!(e.account_balance(USER, l.wallet).await.unwrap(), cents(-60_00));

    let removed = e
        .delete_transaction(USER, created.id, BatchScope::This)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    let page = e
        .list_transactions(USER, &TransactionListFilter::new(march))
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(e.account_balance(USER, l.wallet).await.unwrap(), MoneyCents::ZERO);
    assert!(matches!(
        e.transaction(USER, created.id).await,
        Err(EngineError::KeyNotFound(_))
    ));
}

#[tokio::test]
async fn validation_rejects_bad_rows() {
    let l = ledger().await;
    let e = &l.engine;

    let zero = NewTransaction::new(date(2025, 3, 1), TransactionKind::Expense, MoneyCents::ZERO, "x")
        .category(l.expense);
    assert!(matches!(
        e.create_transaction(USER, zero).await,
        Err(EngineError::InvalidAmount(_))
    ));

    let same_account =
        NewTransaction::new(date(2025, 3, 1), TransactionKind::Transfer, cents(10_00), "x")
            .from_account(l.wallet)
            .to_account(l.wallet);
    assert!(matches!(
        e.create_transaction(USER, same_account).await,
        Err(EngineError::InvalidInput(_))
    ));

    let no_category =
        NewTransaction::new(date(2025, 3, 1), TransactionKind::Income, cents(10_00), "x");
    assert!(matches!(
        e.create_transaction(USER, no_category).await,
        Err(EngineError::InvalidInput(_))
    ));

    let unknown_category =
        NewTransaction::new(date(2025, 3, 1), TransactionKind::Income, cents(10_00), "x")
            .category(Uuid::new_v4());
    assert!(matches!(
        e.create_transaction(USER, unknown_category).await,
        Err(EngineError::KeyNotFound(_))
    ));

    let mut far_page = TransactionListFilter::new(MonthKey::new(2025, 3).unwrap());
    far_page.page = u64::MAX;
    far_page.page_size = 500;
    assert!(matches!(
        e.list_transactions(USER, &far_page).await,
        Err(EngineError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn installment_split_keeps_total_and_clamps_dates() {
    let l = ledger().await;
    let e = &l.engine;

    let plan = e
        .create_installments(
            USER,
            NewTransaction::new(date(2025, 1, 31), TransactionKind::Expense, cents(100_00), "Pneus")
                .category(l.expense)
                .from_account(l.wallet),
            3,
        )
        .await
        .unwrap();
    assert_eq!(plan.ids.len(), 3);
    assert_eq!(plan.installment_count, 3);
    assert_eq!(plan.installment_amount, cents(33_33));

    let mut rows = Vec::new();
    for id in &plan.ids {
        rows.push(e.transaction(USER, *id).await.unwrap());
    }
    let total: MoneyCents = rows.iter().map(|tx| tx.amount).sum();
    assert_eq!(total, cents(100_00));
    assert_eq!(rows[2].amount, cents(33_34));
    assert_eq!(
        rows.iter().map(|tx| tx.date).collect::<Vec<_>>(),
        vec![date(2025, 1, 31), date(2025, 2, 28), date(2025, 3, 31)]
    );
    assert_eq!(
        rows.iter().map(|tx| tx.installment_number).collect::<Vec<_>>(),
        vec![Some(1), Some(2), Some(3)]
    );
    assert_eq!(rows[0].payment_status, Some(PaymentStatus::Paid));
    assert_eq!(rows[1].payment_status, Some(PaymentStatus::Pending));
    assert_eq!(rows[2].payment_status, Some(PaymentStatus::Pending));

    let details = e.installment_details(USER, plan.group_id).await.unwrap();
    assert!(!details.inferred);
    assert_eq!(details.stats.paid, 1);
    assert_eq!(details.stats.pending, 2);
    assert_eq!(details.stats.progress, 33);
}

#[tokio::test]
async fn interest_applies_after_the_first_installment() {
    let l = ledger().await;
    let plan = l
        .engine
        .create_installments(
            USER,
            NewTransaction::new(date(2025, 1, 10), TransactionKind::Expense, cents(300_00), "Sofá")
                .category(l.expense)
                .interest_rate(2.0),
            3,
        )
        .await
        .unwrap();

    let second = l.engine.transaction(USER, plan.ids[1]).await.unwrap();
    let third = l.engine.transaction(USER, plan.ids[2]).await.unwrap();
    assert_eq!(second.interest_amount, cents(2_00));
    assert_eq!(second.amount, cents(102_00));
    assert_eq!(third.interest_amount, cents(4_00));
    assert_eq!(third.amount, cents(104_00));
}

#[tokio::test]
async fn open_ended_plans_repeat_the_amount() {
    let l = ledger().await;
    let plan = l
        .engine
        .create_installments(
            USER,
            NewTransaction::new(date(2025, 1, 5), TransactionKind::Expense, cents(89_90), "Internet")
                .category(l.expense),
            engine::OPEN_ENDED_COUNT,
        )
        .await
        .unwrap();
    assert_eq!(plan.ids.len(), 12);
    assert_eq!(plan.installment_count, -1);
    for id in &plan.ids {
        let tx = l.engine.transaction(USER, *id).await.unwrap();
        assert_eq!(tx.amount, cents(89_90));
    }
}

async fn three_installments(l: &Ledger) -> Vec<Uuid> {
    l.engine
        .create_installments(
            USER,
            NewTransaction::new(date(2025, 1, 10), TransactionKind::Expense, cents(300_00), "Curso")
                .category(l.expense),
            3,
        )
        .await
        .unwrap()
        .ids
}

#[tokio::test]
async fn batch_scopes_select_the_right_members() {
    let l = ledger().await;
    let e = &l.engine;
    let ids = three_installments(&l).await;

    let notes = |text: &str| TransactionPatch {
        notes: Some(text.to_string()),
        ..Default::default()
    };

    e.update_transaction(USER, ids[1], notes("following"), BatchScope::Following)
        .await
        .unwrap();
    let mut seen = Vec::new();
    for id in &ids {
        seen.push(e.transaction(USER, *id).await.unwrap().notes);
    }
    assert_eq!(
        seen,
        vec![
            None,
            Some("following".to_string()),
            Some("following".to_string())
        ]
    );

    let updated = e
        .update_transaction(USER, ids[0], notes("all"), BatchScope::All)
        .await
        .unwrap();
    assert_eq!(updated, Updated::Many { count: 3 });

    e.update_transaction(USER, ids[2], notes("this"), BatchScope::This)
        .await
        .unwrap();
    let mut seen = Vec::new();
    for id in &ids {
        seen.push(e.transaction(USER, *id).await.unwrap().notes.unwrap());
    }
    assert_eq!(seen, vec!["all", "all", "this"]);

    let deleted = e
        .delete_transaction(USER, ids[1], BatchScope::Following)
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert!(e.transaction(USER, ids[0]).await.is_ok());
    assert!(e.transaction(USER, ids[2]).await.is_err());

    let others = three_installments(&l).await;
    let deleted = e
        .delete_transaction(USER, others[1], BatchScope::All)
        .await
        .unwrap();
    assert_eq!(deleted, 3);
}

#[tokio::test]
async fn batch_date_change_shifts_every_member() {
    let l = ledger().await;
    let e = &l.engine;
    let ids = three_installments(&l).await;

    let patch = TransactionPatch {
        date: Some(date(2025, 2, 15)),
        ..Default::default()
    };
    e.update_transaction(USER, ids[1], patch, BatchScope::All)
        .await
        .unwrap();

    let mut dates = Vec::new();
    for id in &ids {
        dates.push(e.transaction(USER, *id).await.unwrap().date);
    }
    assert_eq!(
        dates,
        vec![date(2025, 1, 15), date(2025, 2, 15), date(2025, 3, 15)]
    );
}

#[tokio::test]
async fn installment_payments_and_cancellation() {
    let l = ledger().await;
    let e = &l.engine;
    let ids = three_installments(&l).await;

    let paid = e
        .mark_installment_paid(USER, ids[1], Some(date(2025, 2, 12)), Some(cents(95_00)))
        .await
        .unwrap();
    assert_eq!(paid.payment_status, Some(PaymentStatus::Paid));
    assert_eq!(paid.amount, cents(95_00));
    assert_eq!(paid.payment_date, Some(date(2025, 2, 12)));
    assert!(matches!(
        e.mark_installment_paid(USER, ids[1], None, None).await,
        Err(EngineError::AlreadyPaid(_))
    ));

    let canceled = e
        .cancel_installment(USER, ids[0], engine::CancelScope::All)
        .await
        .unwrap();
    // Paid rows are left alone.
    assert_eq!(canceled.canceled_count, 1);
    let third = e.transaction(USER, ids[2]).await.unwrap();
    assert_eq!(third.payment_status, Some(PaymentStatus::Canceled));

    let first = e.transaction(USER, ids[0]).await.unwrap();
    let details = e
        .installment_details(USER, first.group_id.unwrap())
        .await
        .unwrap();
    assert_eq!(details.stats.paid, 2);
    assert_eq!(details.stats.canceled, 1);
    assert_eq!(details.stats.pending, 0);
}

#[tokio::test]
async fn bulk_payment_skips_paid_rows() {
    let l = ledger().await;
    let ids = three_installments(&l).await;

    let outcome = l.engine.mark_multiple_paid(USER, &ids, None).await.unwrap();
    assert_eq!(outcome.count, 2);
    assert!(outcome.skipped_card.is_empty());
    for id in &ids {
        let tx = l.engine.transaction(USER, *id).await.unwrap();
        assert_eq!(tx.payment_status, Some(PaymentStatus::Paid));
    }
}

#[tokio::test]
async fn reserve_rolls_deposits_forward() {
    let l = ledger().await;
    let e = &l.engine;

    for (day, from, to, amount) in [
        (date(2025, 1, 15), l.wallet, l.investments, 100_00),
        (date(2025, 2, 15), l.wallet, l.investments, 100_00),
        (date(2025, 3, 5), l.investments, l.wallet, 50_00),
    ] {
        e.create_transaction(
            USER,
            NewTransaction::new(day, TransactionKind::Transfer, cents(amount), "Reserva")
                .from_account(from)
                .to_account(to),
        )
        .await
        .unwrap();
    }

    let timeline = e.reserve_timeline(USER).await.unwrap();
    let balances: Vec<MoneyCents> = timeline.iter().map(|row| row.balance).collect();
    assert_eq!(balances, vec![cents(100_00), cents(200_00), cents(150_00)]);
    assert_eq!(timeline[2].deposits, cents(-50_00));

    let march = e
        .reserve_for_month(USER, MonthKey::new(2025, 3).unwrap())
        .await
        .unwrap();
    assert_eq!(march.balance, cents(150_00));
}

#[tokio::test]
async fn dashboard_counts_both_fixed_cost_spellings() {
    let l = ledger().await;
    let e = &l.engine;
    let categories = e.list_categories(USER, false).await.unwrap();
    let singular = categories.iter().find(|c| c.name == "Despesa Fixa").unwrap().id;
    let plural = e
        .create_category(USER, CategoryCmd::new("Despesas Fixas", CategoryScope::Expense))
        .await
        .unwrap()
        .id;

    for (category, amount) in [(singular, 30_00), (plural, 50_00)] {
        e.create_transaction(
            USER,
            NewTransaction::new(date(2025, 3, 3), TransactionKind::Expense, cents(amount), "Internet")
                .category(category)
                .from_account(l.wallet),
        )
        .await
        .unwrap();
    }

    let dashboard = e
        .dashboard(USER, MonthKey::new(2025, 3).unwrap())
        .await
        .unwrap();
    assert_eq!(dashboard.fixed, cents(80_00));
    assert_eq!(dashboard.expense, cents(80_00));
}

#[tokio::test]
async fn maintenance_spending_consumes_the_reserve() {
    let l = ledger().await;
    let e = &l.engine;
    let categories = e.list_categories(USER, false).await.unwrap();
    let maintenance = categories.iter().find(|c| c.name == "Manutenção").unwrap().id;

    e.create_transaction(
        USER,
        NewTransaction::new(date(2025, 3, 1), TransactionKind::Transfer, cents(500_00), "Reserva")
            .from_account(l.wallet)
            .to_account(l.investments),
    )
    .await
    .unwrap();
    e.create_transaction(
        USER,
        NewTransaction::new(date(2025, 3, 2), TransactionKind::Expense, cents(120_00), "Revisão")
            .category(maintenance)
            .from_account(l.wallet),
    )
    .await
    .unwrap();

    let month = e
        .reserve_for_month(USER, MonthKey::new(2025, 3).unwrap())
        .await
        .unwrap();
    assert_eq!(month.deposits, cents(500_00));
    assert_eq!(month.usage, cents(120_00));
    assert_eq!(month.balance, cents(380_00));

    let dashboard = e
        .dashboard(USER, MonthKey::new(2025, 3).unwrap())
        .await
        .unwrap();
    assert_eq!(dashboard.expense, cents(120_00));
    assert_eq!(dashboard.maintenance, cents(120_00));
    assert_eq!(dashboard.transfers_to_reserve, cents(500_00));
    assert_eq!(dashboard.profit, cents(-620_00));
    assert_eq!(dashboard.reserve.balance, cents(380_00));
}

#[tokio::test]
async fn reconciliation_marks_rows() {
    let l = ledger().await;
    let e = &l.engine;
    let created = e
        .create_transaction(
            USER,
            NewTransaction::new(date(2025, 3, 3), TransactionKind::Expense, cents(40_00), "Lanche")
                .category(l.expense)
                .paid(false),
        )
        .await
        .unwrap();

    let reconciled = e
        .reconcile_transaction(USER, created.id, Some(date(2025, 3, 4)))
        .await
        .unwrap();
    assert_eq!(reconciled.reconciliation, engine::ReconciliationStatus::Reconciled);
    assert_eq!(reconciled.reconciliation_date, Some(date(2025, 3, 4)));
}

#[tokio::test]
async fn twelve_month_report_ends_with_the_current_month() {
    let l = ledger().await;
    let e = &l.engine;
    e.create_transaction(
        USER,
        NewTransaction::new(date(2025, 2, 1), TransactionKind::Income, cents(800_00), "Corrida")
            .category(l.income)
            .to_account(l.wallet),
    )
    .await
    .unwrap();

    let report = e.report_12_months(USER).await.unwrap();
    assert_eq!(report.len(), 12);
    assert_eq!(report[11].month, MonthKey::new(2025, 3).unwrap());
    assert_eq!(report[0].month, MonthKey::new(2024, 4).unwrap());
    let february = report
        .iter()
        .find(|row| row.month == MonthKey::new(2025, 2).unwrap())
        .unwrap();
    assert_eq!(february.income, cents(800_00));
    assert_eq!(february.profit, cents(800_00));
}
