use chrono::NaiveDate;
use sea_orm::Database;

use engine::{
    AccountCmd, AccountRemoval, CategoryCmd, CategoryRemoval, CategoryScope, ConfigKey, Engine,
    EngineError, MoneyCents, NewTransaction, TransactionKind, WALLET_ACCOUNT_NAME,
};
use migration::MigratorTrait;

const USER: &str = "alice";
const OTHER: &str = "bob";

async fn engine() -> Engine {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db)
        .today(NaiveDate::from_ymd_opt(2025, 3, 15).unwrap())
        .build()
        .await
        .unwrap();
    engine.bootstrap_user(USER).await.unwrap();
    engine.bootstrap_user(OTHER).await.unwrap();
    engine
}

fn expense(category: uuid::Uuid) -> NewTransaction {
    NewTransaction::new(
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        TransactionKind::Expense,
        MoneyCents::new(10_00),
        "Lavagem",
    )
    .category(category)
}

#[tokio::test]
async fn shared_categories_are_read_only() {
    let e = engine().await;
    let shared = e
        .list_categories(USER, false)
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.name == "Outros")
        .unwrap();
    assert!(shared.owner_user_id.is_none());

    let err = e.delete_category(USER, shared.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
    let err = e
        .update_category(USER, shared.id, CategoryCmd::new("Mine", CategoryScope::Both))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn referenced_categories_are_only_deactivated() {
    let e = engine().await;
    let used = e
        .create_category(
            USER,
            CategoryCmd::new("Lava-jato", CategoryScope::Expense)
                .emoji("🧽")
                .color("#00aaff"),
        )
        .await
        .unwrap();
    assert_eq!(used.color.as_deref(), Some("#00AAFF"));
    let unused = e
        .create_category(USER, CategoryCmd::new("Multas", CategoryScope::Expense))
        .await
        .unwrap();
    assert!(unused.order > used.order);

    e.create_transaction(USER, expense(used.id)).await.unwrap();

    let removal = e.delete_category(USER, used.id).await.unwrap();
    assert_eq!(removal, CategoryRemoval::Deactivated);
    assert_eq!(removal.code(), Some("HAS_TRANSACTIONS"));
    assert_eq!(
        e.delete_category(USER, unused.id).await.unwrap(),
        CategoryRemoval::Removed
    );

    let active = e.list_categories(USER, false).await.unwrap();
    assert!(active.iter().all(|c| c.id != used.id && c.id != unused.id));
    let all = e.list_categories(USER, true).await.unwrap();
    assert!(all.iter().any(|c| c.id == used.id && !c.active));

    // Invisible to other users.
    let err = e.delete_category(OTHER, used.id).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn category_input_is_validated() {
    let e = engine().await;
    let err = e
        .create_category(USER, CategoryCmd::new("  ", CategoryScope::Both))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    let err = e
        .create_category(
            USER,
            CategoryCmd::new("Cor", CategoryScope::Both).color("blue"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn reorder_touches_only_owned_categories() {
    let e = engine().await;
    let a = e
        .create_category(USER, CategoryCmd::new("A", CategoryScope::Both))
        .await
        .unwrap();
    let b = e
        .create_category(USER, CategoryCmd::new("B", CategoryScope::Both))
        .await
        .unwrap();
    let shared = e.list_categories(USER, false).await.unwrap()[0].id;

    let updated = e
        .reorder_categories(USER, &[(a.id, 900), (b.id, 800), (shared, 0)])
        .await
        .unwrap();
    assert_eq!(updated, 2);

    let list = e.list_categories(USER, false).await.unwrap();
    let position = |id| list.iter().position(|c| c.id == id).unwrap();
    assert!(position(b.id) < position(a.id));
}

#[tokio::test]
async fn accounts_keep_unique_names_and_history() {
    let e = engine().await;
    let bank = e
        .create_account(
            USER,
            AccountCmd::new("Nubank", "checking")
                .institution("Nu")
                .initial_balance(MoneyCents::new(250_00)),
        )
        .await
        .unwrap();
    assert_eq!(
        e.account_balance(USER, bank.id).await.unwrap(),
        MoneyCents::new(250_00)
    );

    let err = e
        .create_account(USER, AccountCmd::new("nubank", "checking"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExistingKey(_)));
    // Names are per user.
    e.create_account(OTHER, AccountCmd::new("Nubank", "checking"))
        .await
        .unwrap();

    let category = e.list_categories(USER, false).await.unwrap()[0].id;
    let mut paid = expense(category).from_account(bank.id).paid(true);
    paid.amount = MoneyCents::new(50_00);
    e.create_transaction(USER, paid).await.unwrap();
    assert_eq!(
        e.account_balance(USER, bank.id).await.unwrap(),
        MoneyCents::new(200_00)
    );

    assert_eq!(
        e.deactivate_account(USER, bank.id).await.unwrap(),
        AccountRemoval::Deactivated
    );
    let listed = e.list_accounts(USER, false).await.unwrap();
    assert!(listed.iter().all(|a| a.account.id != bank.id));

    let spare = e
        .create_account(USER, AccountCmd::new("Poupança", "savings"))
        .await
        .unwrap();
    assert_eq!(
        e.deactivate_account(USER, spare.id).await.unwrap(),
        AccountRemoval::Removed
    );
    let err = e.account_balance(USER, spare.id).await.unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn accounts_are_private() {
    let e = engine().await;
    let wallet = e
        .list_accounts(USER, false)
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.account.name == WALLET_ACCOUNT_NAME)
        .unwrap()
        .account;
    let err = e.account_balance(OTHER, wallet.id).await.unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn config_is_seeded_and_validated() {
    let e = engine().await;
    let entries = e.config_entries(USER).await.unwrap();
    assert!(entries.contains(&(ConfigKey::Currency, "BRL".to_string())));

    let config = e
        .save_config(
            USER,
            vec![
                (ConfigKey::MonthlyMaintenanceReserve, "300".to_string()),
                (ConfigKey::Timezone, "Europe/Rome".to_string()),
            ],
        )
        .await
        .unwrap();
    assert_eq!(config.monthly_maintenance_reserve, MoneyCents::new(300_00));
    assert_eq!(config.timezone, chrono_tz::Europe::Rome);

    let err = e
        .save_config(USER, vec![(ConfigKey::Timezone, "Mars/Olympus".to_string())])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
    let err = e
        .save_config(
            USER,
            vec![(ConfigKey::MaintenanceReserveGoal, "abc".to_string())],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    assert!(ConfigKey::try_from("NOPE").is_err());
    // Other users keep their own values.
    assert_eq!(
        e.config(OTHER).await.unwrap().monthly_maintenance_reserve,
        MoneyCents::new(500_00)
    );
}
