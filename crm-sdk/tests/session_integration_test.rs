//! Integration tests for RemoteSession batching against the in-memory backend.
//!
//! These tests exercise the chunking and error-reporting boundaries of bulk save,
//! delete and paginated query through the public API only.

use crm_sdk::{
    CallRecord, Contact, Credentials, Error, InMemoryCrm, RemoteApiFactory, RemoteSession, SObject,
};

fn credentials() -> Credentials {
    Credentials::new("integration@example.com", "secret")
}

async fn setup() -> (InMemoryCrm, RemoteSession) {
    let crm = InMemoryCrm::new(credentials());
    let session = RemoteSession::connect(crm.create_client(), &credentials())
        .await
        .unwrap();
    crm.clear_calls().await;
    (crm, session)
}

fn contacts(count: usize) -> Vec<Contact> {
    (0..count)
        .map(|i| Contact::new("Test", format!("Contact {:03}", i)))
        .collect()
}

async fn seed_ids(crm: &InMemoryCrm, count: usize) -> Vec<String> {
    let mut ids = Vec::with_capacity(count);
    for contact in contacts(count) {
        ids.push(crm.seed(contact.to_record().unwrap()).await);
    }
    ids
}

#[tokio::test]
async fn test_bulk_save_small_batch_uses_one_create_call() {
    let (crm, mut session) = setup().await;
    let mut records = contacts(10);

    let saved = session.bulk_save(&mut records).await.unwrap();

    assert_eq!(saved, 10);
    assert_eq!(
        crm.calls().await,
        vec![CallRecord::Create { sobject_type: "Contact".to_string(), count: 10 }]
    );

    let stored = crm.records_of("Contact").await;
    for (record, stored) in records.iter().zip(&stored) {
        assert_eq!(record.id, stored.id);
        assert_eq!(stored.fields["LastName"], serde_json::json!(record.last_name));
    }
}

#[tokio::test]
async fn test_bulk_save_chunks_new_records_at_200() {
    let (crm, mut session) = setup().await;
    let mut records = contacts(450);

    assert_eq!(session.bulk_save(&mut records).await.unwrap(), 450);

    let counts: Vec<usize> = crm
        .calls()
        .await
        .into_iter()
        .map(|call| match call {
            CallRecord::Create { count, .. } => count,
            other => panic!("unexpected call: {:?}", other),
        })
        .collect();
    assert_eq!(counts, vec![200, 200, 50]);
    assert!(records.iter().all(|r| !r.is_new()));
}

#[tokio::test]
async fn test_bulk_save_existing_records_use_update() {
    let (crm, mut session) = setup().await;
    let ids = seed_ids(&crm, 3).await;

    let mut records: Vec<Contact> = ids
        .iter()
        .map(|id| Contact::new("Renamed", "Contact").with_id(id.clone()))
        .collect();
    records.push(Contact::new("Brand", "New"));

    assert_eq!(session.bulk_save(&mut records).await.unwrap(), 4);
    assert_eq!(
        crm.calls().await,
        vec![
            CallRecord::Create { sobject_type: "Contact".to_string(), count: 1 },
            CallRecord::Update { sobject_type: "Contact".to_string(), count: 3 },
        ]
    );
    assert_eq!(crm.records_of("Contact").await.len(), 4);
    assert_eq!(records[0].id.as_deref(), Some(ids[0].as_str()));
}

#[tokio::test]
async fn test_bulk_save_failure_keeps_earlier_chunks() {
    let (crm, mut session) = setup().await;
    crm.reject_field_value("LastName", "Contact 250", "duplicate detected").await;
    let mut records = contacts(300);

    let err = session.bulk_save(&mut records).await.unwrap_err();

    match err {
        Error::RemoteBulkSaveFailed(breakdown) => {
            assert_eq!(breakdown, "\n\tError 250:\n\t\tduplicate detected");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // First chunk stays persisted and keeps its ids; second chunk is not written back.
    assert!(records[..200].iter().all(|r| !r.is_new()));
    assert!(records[200..].iter().all(|r| r.is_new()));
    assert_eq!(crm.records_of("Contact").await.len(), 200 + 99);
}

#[tokio::test]
async fn test_bulk_save_failure_names_position_in_input() {
    let (crm, mut session) = setup().await;
    let existing_id = crm.seed(Contact::new("Old", "Before").to_record().unwrap()).await;
    crm.reject_field_value("LastName", "Bad", "blocked").await;
    let mut records = vec![
        Contact::new("New", "Fine"),
        Contact::new("Old", "Bad").with_id(existing_id),
        Contact::new("New", "Also fine"),
    ];

    let err = session.bulk_save(&mut records).await.unwrap_err();

    match err {
        Error::RemoteBulkSaveFailed(breakdown) => {
            assert_eq!(breakdown, "\n\tError 1:\n\t\tblocked");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!records[0].is_new());
    assert!(!records[2].is_new());
}

#[tokio::test]
async fn test_bulk_save_empty_makes_no_call() {
    let (crm, mut session) = setup().await;
    let mut records: Vec<Contact> = Vec::new();
    assert_eq!(session.bulk_save(&mut records).await.unwrap(), 0);
    assert!(crm.calls().await.is_empty());
}

#[tokio::test]
async fn test_delete_250_ids_uses_two_calls() {
    let (crm, mut session) = setup().await;
    let ids = seed_ids(&crm, 250).await;

    assert_eq!(session.delete(&ids).await.unwrap(), 250);
    assert_eq!(
        crm.calls().await,
        vec![CallRecord::Delete { count: 200 }, CallRecord::Delete { count: 50 }]
    );
    assert!(crm.records_of("Contact").await.is_empty());
}

#[tokio::test]
async fn test_delete_failure_in_second_chunk_fails_whole_call() {
    let (crm, mut session) = setup().await;
    let ids = seed_ids(&crm, 250).await;
    crm.reject_delete(ids[230].clone()).await;

    let err = session.delete(&ids).await.unwrap_err();

    match err {
        Error::RemoteDeleteFailed(breakdown) => {
            assert!(breakdown.starts_with("\n\tError 230:\n\t\t"));
            assert!(breakdown.contains(&ids[230]));
            assert_eq!(breakdown.matches("Error ").count(), 1);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // Both chunks were sent; only the rejected record survives.
    assert_eq!(crm.calls().await.len(), 2);
    assert_eq!(crm.records_of("Contact").await.len(), 1);
}

#[tokio::test]
async fn test_delete_failure_in_first_chunk_still_sends_second() {
    let (crm, mut session) = setup().await;
    let ids = seed_ids(&crm, 250).await;
    crm.reject_delete(ids[5].clone()).await;

    let err = session.delete(&ids).await.unwrap_err();
    assert!(matches!(err, Error::RemoteDeleteFailed(ref b) if b.contains("Error 5:")));
    assert_eq!(
        crm.calls().await,
        vec![CallRecord::Delete { count: 200 }, CallRecord::Delete { count: 50 }]
    );
}

#[tokio::test]
async fn test_query_follows_locators_in_order() {
    let (crm, mut session) = setup().await;
    crm.set_page_size(4).await;
    seed_ids(&crm, 10).await;

    let result: Vec<Contact> = session
        .query("SELECT Id, LastName FROM Contact")
        .await
        .unwrap();

    let names: Vec<&str> = result.iter().map(|c| c.last_name.as_str()).collect();
    let expected: Vec<String> = (0..10).map(|i| format!("Contact {:03}", i)).collect();
    assert_eq!(names, expected);

    let query_more_calls = crm
        .calls()
        .await
        .into_iter()
        .filter(|call| matches!(call, CallRecord::QueryMore { .. }))
        .count();
    assert_eq!(query_more_calls, 2);
}

#[tokio::test]
async fn test_save_then_query_round_trip() {
    let (_crm, mut session) = setup().await;

    let mut contact = Contact::new("Grace", "Hopper").with_email("grace@example.com");
    session.save(&mut contact).await.unwrap();

    let found: Vec<Contact> = session.query("SELECT Id FROM Contact").await.unwrap();
    assert_eq!(found, vec![contact]);
}
