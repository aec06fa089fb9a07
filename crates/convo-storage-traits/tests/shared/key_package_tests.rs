//! Key package storage test functions

use convo_storage_traits::key_packages::types::KeyPackage;
use convo_storage_traits::{ConvoStorageProvider, StorageError, Timestamp};

use super::{create_test_conversation, create_test_key_package, did};

pub fn test_create_and_find_key_package<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    let new = create_test_key_package(1, 1_000);
    let expected_id = KeyPackage::compute_id(&new.key_package_data);
    let created = storage.create_key_package(new.clone()).unwrap();
    assert_eq!(created.key_package_id, expected_id);
    assert!(!created.is_used);
    assert!(created.conversation_id.is_none());

    let found = storage.find_key_package(&expected_id).unwrap().unwrap();
    assert_eq!(found, created);

    let result = storage.create_key_package(new);
    assert!(matches!(result, Err(StorageError::DuplicateId(_))));
}

pub fn test_available_key_packages<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_key_package(create_test_key_package(1, 300))
        .unwrap();
    storage
        .create_key_package(create_test_key_package(2, 100))
        .unwrap();
    storage
        .create_key_package(create_test_key_package(3, 200))
        .unwrap();
    storage
        .create_key_package(create_test_key_package(4, 50))
        .unwrap();

    let now = Timestamp::from_secs(50);
    let available = storage.available_key_packages(&did("me"), now).unwrap();
    let expiries: Vec<u64> = available.iter().map(|kp| kp.expires_at.as_secs()).collect();
    assert_eq!(expiries, vec![100, 200, 300]);
    assert_eq!(
        storage
            .count_available_key_packages(&did("me"), now)
            .unwrap(),
        3
    );
    assert_eq!(
        storage
            .count_available_key_packages(&did("someone-else"), now)
            .unwrap(),
        0
    );
}

pub fn test_mark_key_package_as_used<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    let far_future = Timestamp::now().add_days(30).as_secs();
    let kp = storage
        .create_key_package(create_test_key_package(1, far_future))
        .unwrap();

    let result = storage.mark_key_package_as_used("missing", "convo-1");
    assert!(matches!(result, Err(StorageError::NotFound(_))));

    let result = storage.mark_key_package_as_used(&kp.key_package_id, "missing");
    assert!(matches!(result, Err(StorageError::UnknownConversation(_))));
    assert!(
        !storage
            .find_key_package(&kp.key_package_id)
            .unwrap()
            .unwrap()
            .is_used
    );

    let used = storage
        .mark_key_package_as_used(&kp.key_package_id, "convo-1")
        .unwrap();
    assert!(used.is_used);
    assert!(used.used_at.is_some());
    assert_eq!(used.conversation_id.as_deref(), Some("convo-1"));

    let result = storage.mark_key_package_as_used(&kp.key_package_id, "convo-1");
    assert!(matches!(result, Err(StorageError::KeyPackageUnavailable(_))));
}

pub fn test_expired_key_package_cannot_be_used<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    let kp = storage
        .create_key_package(create_test_key_package(1, 10))
        .unwrap();
    let result = storage.mark_key_package_as_used(&kp.key_package_id, "convo-1");
    assert!(matches!(result, Err(StorageError::KeyPackageUnavailable(_))));
}

pub fn test_delete_key_packages<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    let a = storage
        .create_key_package(create_test_key_package(1, 100))
        .unwrap();
    storage
        .create_key_package(create_test_key_package(2, 200))
        .unwrap();
    storage
        .create_key_package(create_test_key_package(3, 300))
        .unwrap();

    assert!(storage.delete_key_package(&a.key_package_id).unwrap());
    assert!(!storage.delete_key_package(&a.key_package_id).unwrap());

    // Expiry at exactly `now` counts as expired
    let deleted = storage
        .delete_expired_key_packages(Timestamp::from_secs(200))
        .unwrap();
    assert_eq!(deleted, 1);
    let left = storage
        .available_key_packages(&did("me"), Timestamp::from_secs(0))
        .unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].expires_at.as_secs(), 300);
}
