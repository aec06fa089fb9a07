//! Member storage test functions

use convo_storage_traits::members::types::MemberRole;
use convo_storage_traits::{ConvoStorageProvider, StorageError};

use super::{create_test_admin, create_test_conversation, create_test_member, did};

pub fn test_create_and_list_members<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();

    // Insert out of leaf order; listing is by leaf index
    storage
        .create_member(create_test_member("convo-1", "carol", 2))
        .unwrap();
    let alice = storage
        .create_member(create_test_admin("convo-1", "alice", 0))
        .unwrap();
    storage
        .create_member(create_test_member("convo-1", "bob", 1))
        .unwrap();

    assert_eq!(alice.member_id, format!("convo-1:{}:0", did("alice")));
    assert_eq!(alice.role, MemberRole::Admin);
    assert!(alice.is_active);
    assert!(alice.removed_at.is_none());

    let members = storage.members("convo-1", true).unwrap();
    let leaves: Vec<u32> = members.iter().map(|m| m.leaf_index).collect();
    assert_eq!(leaves, vec![0, 1, 2]);

    let bob = storage.find_member("convo-1", &did("bob")).unwrap().unwrap();
    assert_eq!(bob.role, MemberRole::Member);
    assert!(storage.find_member("convo-1", &did("dave")).unwrap().is_none());
}

pub fn test_member_requires_conversation<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    let result = storage.create_member(create_test_member("missing", "alice", 0));
    assert!(matches!(result, Err(StorageError::UnknownConversation(_))));
}

pub fn test_leaf_index_unique_among_active_members<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    storage
        .create_member(create_test_member("convo-1", "alice", 0))
        .unwrap();

    let result = storage.create_member(create_test_member("convo-1", "bob", 0));
    assert!(matches!(
        result,
        Err(StorageError::LeafIndexInUse { leaf_index: 0, .. })
    ));

    let result = storage.create_member(create_test_member("convo-1", "alice", 1));
    assert!(matches!(result, Err(StorageError::DuplicateId(_))));

    // Once alice leaves, her leaf can be reused
    storage.mark_member_removed("convo-1", &did("alice")).unwrap();
    let bob = storage
        .create_member(create_test_member("convo-1", "bob", 0))
        .unwrap();
    assert_eq!(bob.leaf_index, 0);
}

pub fn test_update_member_role<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    storage
        .create_member(create_test_member("convo-1", "bob", 1))
        .unwrap();

    let promoted = storage
        .update_member_role("convo-1", &did("bob"), MemberRole::Admin)
        .unwrap();
    assert!(promoted.role.is_admin());

    let stored = storage.find_member("convo-1", &did("bob")).unwrap().unwrap();
    assert_eq!(stored.role, MemberRole::Admin);

    let demoted = storage
        .update_member_role("convo-1", &did("bob"), MemberRole::Member)
        .unwrap();
    assert_eq!(demoted.role, MemberRole::Member);

    let result = storage.update_member_role("convo-1", &did("nobody"), MemberRole::Admin);
    assert!(matches!(result, Err(StorageError::NotFound(_))));
}

pub fn test_mark_member_removed<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    storage
        .create_member(create_test_admin("convo-1", "alice", 0))
        .unwrap();
    storage
        .create_member(create_test_member("convo-1", "bob", 1))
        .unwrap();

    let removed = storage.mark_member_removed("convo-1", &did("bob")).unwrap();
    assert!(!removed.is_active);
    assert!(removed.removed_at.is_some());

    // History keeps the row, the active view drops it
    assert_eq!(storage.members("convo-1", false).unwrap().len(), 2);
    let active = storage.members("convo-1", true).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].did, did("alice"));
    assert!(storage.find_member("convo-1", &did("bob")).unwrap().is_none());

    let result = storage.mark_member_removed("convo-1", &did("bob"));
    assert!(matches!(result, Err(StorageError::NotFound(_))));
}

pub fn test_invalid_did_rejected<S>(storage: S)
where
    S: ConvoStorageProvider,
{
    storage
        .create_conversation(create_test_conversation("convo-1"))
        .unwrap();
    let mut member = create_test_member("convo-1", "alice", 0);
    member.did = "alice".to_string();
    let result = storage.create_member(member);
    assert!(matches!(result, Err(StorageError::InvalidParameters(_))));
    assert!(storage.members("convo-1", false).unwrap().is_empty());
}
