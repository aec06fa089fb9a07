//! Message storage test functions

use convo_storage_traits::messages::MAX_MESSAGE_CONTENT_SIZE;
use convo_storage_traits::{ConvoStorageProvider, StorageError, Timestamp};

use super::{create_test_conversation, create_test_message};

pub fn test_sequence_numbers_increase<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    storage
        .create_conversation(create_test_conversation("convo-2"))
        .unwrap();

    let first = storage
        .create_message(create_test_message("convo-1", "m1", 100))
        .unwrap();
    let second = storage
        .create_message(create_test_message("convo-1", "m2", 50))
        .unwrap();
    let other = storage
        .create_message(create_test_message("convo-2", "m3", 10))
        .unwrap();

    assert_eq!(first.sequence_number, 1);
    assert_eq!(second.sequence_number, 2);
    // Per conversation
    assert_eq!(other.sequence_number, 1);

    let ids: Vec<String> = storage
        .messages("convo-1")
        .unwrap()
        .into_iter()
        .map(|m| m.message_id)
        .collect();
    assert_eq!(ids, vec!["m1", "m2"]);
}

pub fn test_message_errors<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    let result = storage.create_message(create_test_message("missing", "m1", 1));
    assert!(matches!(result, Err(StorageError::UnknownConversation(_))));

    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    storage
        .create_message(create_test_message("convo-1", "m1", 1))
        .unwrap();
    let result = storage.create_message(create_test_message("convo-1", "m1", 2));
    assert!(matches!(result, Err(StorageError::DuplicateId(_))));

    let mut oversized = create_test_message("convo-1", "big", 3);
    oversized.content = vec![0u8; MAX_MESSAGE_CONTENT_SIZE + 1];
    let result = storage.create_message(oversized);
    assert!(matches!(result, Err(StorageError::InvalidParameters(_))));

    assert_eq!(storage.messages("convo-1").unwrap().len(), 1);
}

pub fn test_delivery_flags<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    let message = storage
        .create_message(create_test_message("convo-1", "m1", 1))
        .unwrap();
    assert!(!message.is_delivered);
    assert!(!message.is_read);

    storage.mark_message_delivered("m1").unwrap();
    let stored = storage.find_message("m1").unwrap().unwrap();
    assert!(stored.is_delivered);
    assert!(!stored.is_read);

    storage
        .create_message(create_test_message("convo-1", "m2", 2))
        .unwrap();
    storage.mark_message_read("m2").unwrap();
    let stored = storage.find_message("m2").unwrap().unwrap();
    assert!(stored.is_delivered);
    assert!(stored.is_read);

    assert!(matches!(
        storage.mark_message_delivered("missing"),
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        storage.mark_message_read("missing"),
        Err(StorageError::NotFound(_))
    ));
}

/// Exactly the messages strictly older than the cutoff are removed
pub fn test_cleanup_message_keys<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    storage
        .create_conversation(create_test_conversation("convo-2"))
        .unwrap();

    let ages = [10u64, 500, 999, 1000, 1001, 5000];
    for (i, ts) in ages.iter().enumerate() {
        let convo = if i % 2 == 0 { "convo-1" } else { "convo-2" };
        storage
            .create_message(create_test_message(convo, &format!("m{i}"), *ts))
            .unwrap();
    }

    let deleted = storage
        .cleanup_message_keys(Timestamp::from_secs(1000))
        .unwrap();
    assert_eq!(deleted, 3);

    let mut remaining: Vec<u64> = storage
        .messages("convo-1")
        .unwrap()
        .into_iter()
        .chain(storage.messages("convo-2").unwrap())
        .map(|m| m.timestamp.as_secs())
        .collect();
    remaining.sort_unstable();
    assert_eq!(remaining, vec![1000, 1001, 5000]);

    // Nothing left to remove at the same cutoff
    assert_eq!(
        storage
            .cleanup_message_keys(Timestamp::from_secs(1000))
            .unwrap(),
        0
    );
}

pub fn test_delete_messages_before_epoch<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    for epoch in 0..5u64 {
        let mut message = create_test_message("convo-1", &format!("m{epoch}"), epoch);
        message.epoch = epoch;
        storage.create_message(message).unwrap();
    }

    let deleted = storage.delete_messages_before_epoch("convo-1", 3).unwrap();
    assert_eq!(deleted, 3);

    let epochs: Vec<u64> = storage
        .messages("convo-1")
        .unwrap()
        .into_iter()
        .map(|m| m.epoch)
        .collect();
    assert_eq!(epochs, vec![3, 4]);
}
