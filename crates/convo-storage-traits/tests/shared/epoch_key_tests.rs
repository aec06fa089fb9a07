//! Epoch key storage test functions

use std::collections::BTreeSet;

use convo_storage_traits::epoch_keys::types::EpochKeyState;
use convo_storage_traits::{ConvoStorageProvider, EpochSecret, StorageError};

use super::create_test_conversation;

fn active_epochs<S>(storage: &S, conversation_id: &str) -> Vec<u64>
where
    S: ConvoStorageProvider,
{
    storage
        .epoch_keys(conversation_id, true)
        .unwrap()
        .into_iter()
        .map(|k| k.epoch)
        .collect()
}

fn secret(epoch: u64) -> EpochSecret {
    EpochSecret::new(vec![epoch as u8; 32])
}

pub fn test_record_epoch_key<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    let result = storage.record_epoch_key("missing", 0, None);
    assert!(matches!(result, Err(StorageError::UnknownConversation(_))));

    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    let key = storage
        .record_epoch_key("convo-1", 0, Some(secret(0)))
        .unwrap();
    assert_eq!(key.state, EpochKeyState::Active);
    assert!(key.deleted_at.is_none());
    assert!(key.is_active());

    let result = storage.record_epoch_key("convo-1", 0, None);
    assert!(matches!(result, Err(StorageError::DuplicateId(_))));

    assert_eq!(
        storage.epoch_secret("convo-1", 0).unwrap(),
        Some(secret(0))
    );
    assert!(storage.epoch_secret("convo-1", 1).unwrap().is_none());
}

/// For every K <= N, exactly the K highest epochs stay active
pub fn test_keep_last_k<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    const N: u64 = 6;
    for k in 0..=N {
        let convo = format!("convo-k{k}");
        storage
            .create_conversation(create_test_conversation(&convo))
            .unwrap();
        // Recorded out of order on purpose
        for epoch in (0..N).rev() {
            storage.record_epoch_key(&convo, epoch, None).unwrap();
        }

        let marked = storage.delete_old_epoch_keys(&convo, k as usize).unwrap();
        assert_eq!(marked as u64, N - k);

        let expected: Vec<u64> = (N - k..N).collect();
        assert_eq!(active_epochs(&storage, &convo), expected);

        let all = storage.epoch_keys(&convo, false).unwrap();
        assert_eq!(all.len() as u64, N);
        let unmarked = all.iter().filter(|key| key.deleted_at.is_none()).count();
        assert_eq!(unmarked as u64, k);
    }
}

pub fn test_keep_last_zero_marks_everything<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    for epoch in 0..4 {
        storage
            .record_epoch_key("convo-1", epoch, Some(secret(epoch)))
            .unwrap();
    }

    assert_eq!(storage.delete_old_epoch_keys("convo-1", 0).unwrap(), 4);
    assert!(storage.epoch_keys("convo-1", true).unwrap().is_empty());

    // Marked secrets no longer decrypt anything
    for epoch in 0..4 {
        assert!(storage.epoch_secret("convo-1", epoch).unwrap().is_none());
    }
}

pub fn test_delete_old_epoch_keys_idempotent<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    for epoch in 0..5 {
        storage.record_epoch_key("convo-1", epoch, None).unwrap();
    }

    assert_eq!(storage.delete_old_epoch_keys("convo-1", 2).unwrap(), 3);
    let first: Vec<_> = storage.epoch_keys("convo-1", false).unwrap();
    assert_eq!(storage.delete_old_epoch_keys("convo-1", 2).unwrap(), 0);
    let second: Vec<_> = storage.epoch_keys("convo-1", false).unwrap();
    assert_eq!(first, second);

    let result = storage.delete_old_epoch_keys("missing", 2);
    assert!(matches!(result, Err(StorageError::UnknownConversation(_))));
}

pub fn test_sweep_idempotent_and_global<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    for convo in ["convo-1", "convo-2"] {
        storage
            .create_conversation(create_test_conversation(convo))
            .unwrap();
        for epoch in 0..4 {
            storage
                .record_epoch_key(convo, epoch, Some(secret(epoch)))
                .unwrap();
        }
        storage.delete_old_epoch_keys(convo, 1).unwrap();
    }

    let purged = storage.delete_marked_epoch_keys().unwrap();
    assert_eq!(purged.len(), 6);
    assert!(purged.iter().all(|k| k.state == EpochKeyState::Purged));
    assert!(purged.iter().all(|k| k.secret.is_none()));
    let purged_convos: BTreeSet<&str> =
        purged.iter().map(|k| k.conversation_id.as_str()).collect();
    assert_eq!(purged_convos.len(), 2);

    let after_first: Vec<_> = storage.epoch_keys("convo-1", false).unwrap();
    assert!(storage.delete_marked_epoch_keys().unwrap().is_empty());
    let after_second: Vec<_> = storage.epoch_keys("convo-1", false).unwrap();
    assert_eq!(after_first, after_second);
    assert_eq!(active_epochs(&storage, "convo-1"), vec![3]);
    assert_eq!(active_epochs(&storage, "convo-2"), vec![3]);
}

/// Epochs 1..=10 keeping 3: {8, 9, 10} stay, 7 are marked, 3 remain after the sweep
pub fn test_retention_scenario<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    for epoch in 1..=10 {
        storage
            .record_epoch_key("convo-1", epoch, Some(secret(epoch)))
            .unwrap();
    }

    let marked = storage.delete_old_epoch_keys("convo-1", 3).unwrap();
    assert_eq!(marked, 7);
    assert_eq!(active_epochs(&storage, "convo-1"), vec![8, 9, 10]);

    let marked_rows = storage
        .epoch_keys("convo-1", false)
        .unwrap()
        .into_iter()
        .filter(|k| k.state == EpochKeyState::Marked)
        .count();
    assert_eq!(marked_rows, 7);

    let purged = storage.delete_marked_epoch_keys().unwrap();
    assert_eq!(purged.len(), 7);
    assert_eq!(storage.epoch_keys("convo-1", false).unwrap().len(), 3);
    assert_eq!(
        storage.epoch_secret("convo-1", 10).unwrap(),
        Some(secret(10))
    );
}
