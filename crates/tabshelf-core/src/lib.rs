//! Pure half of the tabshelf reconciliation engine: the platform data model,
//! the normalized session model, the title metadata codec, the normalizer,
//! and the differencer. No I/O happens in this crate.

pub mod codec;
pub mod diff;
pub mod ids;
pub mod normalize;
pub mod platform;
pub mod state;

pub use codec::{
    decode_bookmark_title, decode_group_folder_title, encode_bookmark_title,
    encode_group_folder_title, BookmarkTitle, GroupFolderTitle, PINNED_FOLDER_TITLE,
    UNNAMED_GROUP_TITLE, WORKSPACES_FOLDER_TITLE,
};
pub use diff::{
    diff, has_changes, sort_for_apply, GroupChanges, ItemChanges, Operation,
};
pub use ids::{BookmarkId, GroupId, ItemId, TabGroupId, TabId, WindowId};
pub use normalize::{from_bookmark_tree, from_live_state};
pub use platform::{BookmarkNode, GroupColor, Tab, TabGroup, Window};
pub use state::{GroupKey, NormalizedGroup, NormalizedItem, NormalizedState, StateViolation};
