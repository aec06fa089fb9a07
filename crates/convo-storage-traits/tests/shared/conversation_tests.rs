//! Conversation storage test functions

use convo_storage_traits::{ConvoStorageProvider, GroupId, StorageError, Timestamp};

use super::{create_test_admin, create_test_conversation, create_test_member, create_test_message};

/// Create, find by both keys, and list
pub fn test_create_and_find_conversation<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    let created = storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    assert_eq!(created.conversation_id, "convo-1");
    assert_eq!(created.epoch, 0);
    assert!(created.is_active);
    assert_eq!(created.title.as_deref(), Some("Test Conversation"));

    let found = storage.find_conversation("convo-1").unwrap().unwrap();
    assert_eq!(found, created);

    let by_group = storage
        .find_conversation_by_group_id(&created.group_id)
        .unwrap()
        .unwrap();
    assert_eq!(by_group.conversation_id, "convo-1");

    assert!(storage.find_conversation("missing").unwrap().is_none());
    assert!(
        storage
            .find_conversation_by_group_id(&GroupId::from_slice(&[9, 9, 9]))
            .unwrap()
            .is_none()
    );

    storage
        .create_conversation(create_test_conversation("convo-2"))
        .unwrap();
    assert_eq!(storage.all_conversations().unwrap().len(), 2);
}

/// A second create with the same ID fails and leaves the first intact
pub fn test_duplicate_conversation_id<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();

    let mut duplicate = create_test_conversation("convo-1");
    duplicate.group_id = GroupId::from_slice(b"other-group");
    duplicate.epoch = 7;
    let result = storage.create_conversation(duplicate);
    assert!(matches!(result, Err(StorageError::DuplicateId(_))));

    let stored = storage.find_conversation("convo-1").unwrap().unwrap();
    assert_eq!(stored.epoch, 0);
    assert_eq!(storage.all_conversations().unwrap().len(), 1);
}

/// Updates persist and the epoch never moves backwards
pub fn test_save_conversation<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    let mut convo = storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();

    convo.epoch = 4;
    convo.member_count = 3;
    convo.title = Some("Renamed".to_string());
    storage.save_conversation(&convo).unwrap();

    let stored = storage.find_conversation("convo-1").unwrap().unwrap();
    assert_eq!(stored.epoch, 4);
    assert_eq!(stored.member_count, 3);
    assert_eq!(stored.title.as_deref(), Some("Renamed"));

    convo.epoch = 2;
    let result = storage.save_conversation(&convo);
    assert!(matches!(result, Err(StorageError::InvalidParameters(_))));
    assert_eq!(storage.find_conversation("convo-1").unwrap().unwrap().epoch, 4);

    let mut unknown = stored.clone();
    unknown.conversation_id = "missing".to_string();
    assert!(matches!(
        storage.save_conversation(&unknown),
        Err(StorageError::UnknownConversation(_))
    ));
}

/// Deleting a conversation removes its members, messages and epoch keys
pub fn test_delete_conversation_cascades<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    storage
        .create_conversation(create_test_conversation("convo-2"))
        .unwrap();

    for convo in ["convo-1", "convo-2"] {
        storage
            .create_member(create_test_admin(convo, "alice", 0))
            .unwrap();
        storage
            .create_member(create_test_member(convo, "bob", 1))
            .unwrap();
        storage
            .create_message(create_test_message(convo, &format!("{convo}-m1"), 10))
            .unwrap();
        for epoch in 0..3 {
            storage.record_epoch_key(convo, epoch, None).unwrap();
        }
    }

    storage.delete_conversation("convo-1").unwrap();

    assert!(storage.find_conversation("convo-1").unwrap().is_none());
    assert!(storage.members("convo-1", false).unwrap().is_empty());
    assert!(storage.messages("convo-1").unwrap().is_empty());
    assert!(storage.epoch_keys("convo-1", false).unwrap().is_empty());
    assert!(storage.find_message("convo-1-m1").unwrap().is_none());

    // The other conversation is untouched
    assert_eq!(storage.members("convo-2", false).unwrap().len(), 2);
    assert_eq!(storage.messages("convo-2").unwrap().len(), 1);
    assert_eq!(storage.epoch_keys("convo-2", false).unwrap().len(), 3);

    assert!(matches!(
        storage.delete_conversation("convo-1"),
        Err(StorageError::UnknownConversation(_))
    ));
}

/// Deleting a conversation keeps the consumed key package but drops its link
pub fn test_delete_conversation_unlinks_key_package<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    let kp = storage
        .create_key_package(super::create_test_key_package(1, u64::MAX / 2))
        .unwrap();
    storage
        .mark_key_package_as_used(&kp.key_package_id, "convo-1")
        .unwrap();

    storage.delete_conversation("convo-1").unwrap();

    let stored = storage
        .find_key_package(&kp.key_package_id)
        .unwrap()
        .unwrap();
    assert!(stored.is_used);
    assert!(stored.conversation_id.is_none());
    assert!(stored.used_at.unwrap() <= Timestamp::now());
}
