use rust_decimal_macros::dec;
use serde_json::Value;

use ledgerline_core::budgets::{BudgetRepositoryTrait, NewBudget};
use ledgerline_core::categories::{CategoryRepositoryTrait, NewCategory};
use ledgerline_core::transactions::{TransactionDirection, TransactionRepositoryTrait};

use super::CategoryRepository;
use crate::budgets::BudgetRepository;
use crate::test_support::{date, manual_outflow, pending_for, seed_account, setup_db};
use crate::transactions::TransactionRepository;

fn new_category(id: &str, name: &str, parent: Option<&str>) -> NewCategory {
    NewCategory {
        id: Some(id.to_string()),
        name: name.to_string(),
        kind: TransactionDirection::Outflow,
        parent_id: parent.map(str::to_string),
        color: None,
        icon: None,
    }
}

#[tokio::test]
async fn deleting_a_category_cascades_through_the_write_path() {
    let (pool, writer) = setup_db();
    seed_account(&pool, &writer, "acc-1").await;
    let categories = CategoryRepository::new(pool.clone(), writer.clone());
    let budgets = BudgetRepository::new(pool.clone(), writer.clone());
    let transactions = TransactionRepository::new(pool.clone(), writer.clone());

    categories
        .create_category(new_category("cat-subs", "Subscriptions", None))
        .await
        .unwrap();
    categories
        .create_category(new_category("cat-video", "Video", Some("cat-subs")))
        .await
        .unwrap();
    budgets
        .create_budget(NewBudget {
            id: Some("bud-1".to_string()),
            category_id: "cat-subs".to_string(),
            month: "2024-03".to_string(),
            amount_limit: dec!(120000),
            currency: "COP".to_string(),
        })
        .await
        .unwrap();
    let mut new_tx = manual_outflow("acc-1", date(2024, 3, 2), dec!(44900), "Netflix");
    new_tx.category_id = Some("cat-subs".to_string());
    let tx = transactions.create_transaction(new_tx).await.unwrap();

    assert_eq!(categories.delete_category("cat-subs".to_string()).await.unwrap(), 1);

    assert!(budgets.list_budgets_for_month("2024-03").unwrap().is_empty());
    assert_eq!(transactions.get_transaction(&tx.id).unwrap().category_id, None);
    assert_eq!(categories.get_category("cat-video").unwrap().parent_id, None);

    // Never-synced rows cancel out entirely.
    assert!(pending_for(&pool, "cat-subs").is_empty());
    assert!(pending_for(&pool, "bud-1").is_empty());

    // Pending inserts absorb the cleared references.
    let tx_pending = pending_for(&pool, &tx.id);
    assert_eq!(tx_pending.len(), 1);
    assert_eq!(tx_pending[0].op, "INSERT");
    let payload: Value = serde_json::from_str(&tx_pending[0].payload).unwrap();
    assert_eq!(payload["category_id"], Value::Null);

    let child_pending = pending_for(&pool, "cat-video");
    assert_eq!(child_pending.len(), 1);
    let payload: Value = serde_json::from_str(&child_pending[0].payload).unwrap();
    assert_eq!(payload["parent_id"], Value::Null);
}

#[tokio::test]
async fn deleting_a_missing_category_is_a_no_op() {
    let (pool, writer) = setup_db();
    let categories = CategoryRepository::new(pool.clone(), writer);

    assert_eq!(categories.delete_category("nope".to_string()).await.unwrap(), 0);
    assert!(pending_for(&pool, "nope").is_empty());
}
