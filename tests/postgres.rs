#![cfg(feature = "postgres")]

use countersign::approval::{AnyApprovalRequest, ApprovalRequest, ApprovalRequestStatus};
use countersign::dispatch::{HandlerRegistry, fn_operation};
use countersign::manager::postgres::PostgresApprovalStore;
use countersign::manager::{ApprovalFilter, ApprovalStore};
use countersign::workflow::ApprovalWorkflow;
use countersign::{Actor, CountersignError, HandlerType, NewApprovalRequest};
use serde_json::{Value, json};
use std::sync::Arc;

fn input(request_type: &str) -> NewApprovalRequest {
    NewApprovalRequest {
        handler_type: HandlerType::from("outlet"),
        request_type: request_type.to_string(),
        payload: json!({ "merchant_id": 4, "name": "Yaba" }),
        description: None,
    }
}

#[sqlx::test]
#[test_log::test]
async fn test_lifecycle_round_trips_through_postgres(pool: sqlx::PgPool) {
    let store = Arc::new(PostgresApprovalStore::new(pool));
    let registry = HandlerRegistry::builder()
        .register(
            "outlet",
            "CREATE_OUTLET",
            fn_operation(|payload: Value| {
                Ok::<_, CountersignError>(json!({ "outlet_id": 17, "name": payload["name"] }))
            }),
        )
        .build();
    let workflow = ApprovalWorkflow::new(store.clone(), Arc::new(registry));

    let maker = Actor::new("ada", "MAKER");
    let checker = Actor::new("bola", "CHECKER");
    let request = workflow
        .create(maker.clone(), input("CREATE_OUTLET"))
        .await
        .unwrap();
    workflow.submit(request.id(), &maker).await.unwrap();
    workflow.approve(request.id(), &checker, None).await.unwrap();
    let executed = workflow.execute(request.id(), &checker).await.unwrap();

    match store.get(request.id()).await.unwrap() {
        AnyApprovalRequest::Executed(stored) => {
            assert_eq!(stored, executed);
            assert_eq!(stored.data.version, 4);
            assert_eq!(stored.state.result["outlet_id"], 17);
        }
        other => panic!("expected EXECUTED, got {}", other.status()),
    }
}

#[sqlx::test]
#[test_log::test]
async fn test_stale_write_is_rejected(pool: sqlx::PgPool) {
    let store = PostgresApprovalStore::new(pool);
    let request = ApprovalRequest::create(Actor::new("ada", "MAKER"), input("CREATE_OUTLET"), &store)
        .await
        .unwrap();

    let stale = request.clone();
    request.submit(&store).await.unwrap();

    let err = stale.clone().submit(&store).await.unwrap_err();
    assert!(matches!(err, CountersignError::VersionConflict { expected: 0, .. }));

    let stored = store.get(stale.id()).await.unwrap();
    assert_eq!(stored.status(), ApprovalRequestStatus::Submitted);
    assert_eq!(stored.version(), 1);
}

#[sqlx::test]
#[test_log::test]
async fn test_list_filters_in_sql(pool: sqlx::PgPool) {
    let store = PostgresApprovalStore::new(pool);
    let ada = Actor::new("ada", "MAKER");
    let bola = Actor::new("bola", "MAKER");

    ApprovalRequest::create(ada.clone(), input("CREATE_OUTLET"), &store)
        .await
        .unwrap();
    ApprovalRequest::create(ada, input("CLOSE_OUTLET"), &store)
        .await
        .unwrap()
        .submit(&store)
        .await
        .unwrap();
    ApprovalRequest::create(bola, input("CREATE_OUTLET"), &store)
        .await
        .unwrap();

    let all = store.list(ApprovalFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].data().created_at >= w[1].data().created_at));

    let submitted = store
        .list(ApprovalFilter::default().with_status(ApprovalRequestStatus::Submitted))
        .await
        .unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].data().request_type, "CLOSE_OUTLET");

    let by_maker = store
        .list(ApprovalFilter::default().with_maker("bola").with_limit(5))
        .await
        .unwrap();
    assert_eq!(by_maker.len(), 1);

    let other_module = store
        .list(ApprovalFilter::default().with_handler_type("fee"))
        .await
        .unwrap();
    assert!(other_module.is_empty());
}

#[sqlx::test]
#[test_log::test]
async fn test_get_missing_request(pool: sqlx::PgPool) {
    let store = PostgresApprovalStore::new(pool);
    let id = countersign::ApprovalRequestId::new();
    let err = store.get(id).await.unwrap_err();
    assert!(matches!(err, CountersignError::ApprovalRequestNotFound(missing) if missing == id));
}

#[sqlx::test]
#[test_log::test]
async fn test_duplicate_insert_is_a_validation_error(pool: sqlx::PgPool) {
    let store = PostgresApprovalStore::new(pool);
    let request = ApprovalRequest::create(Actor::new("ada", "MAKER"), input("CREATE_OUTLET"), &store)
        .await
        .unwrap();

    let err = store.insert(&request).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert!(err.to_string().contains("already exists"), "{err}");
}

#[sqlx::test]
#[test_log::test]
async fn test_unbounded_limit_returns_everything(pool: sqlx::PgPool) {
    let store = PostgresApprovalStore::new(pool);
    for request_type in ["CREATE_OUTLET", "CLOSE_OUTLET"] {
        ApprovalRequest::create(Actor::new("ada", "MAKER"), input(request_type), &store)
            .await
            .unwrap();
    }

    let all = store
        .list(ApprovalFilter::default().with_limit(usize::MAX))
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}
