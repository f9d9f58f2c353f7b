use redb::TableDefinition;

/// Tables holding msgpack records (or msgpack id lists) keyed by string.
pub type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Tables mapping a string key to a single id.
pub type LookupTable = TableDefinition<'static, &'static str, &'static str>;

/// Folder records: uuid -> FolderRecord (msgpack)
pub const FOLDERS: RecordTable = TableDefinition::new("folders");

/// Sibling-name index: owner/parent/name -> folder uuid
pub const FOLDER_NAMES: LookupTable = TableDefinition::new("folder_names");

/// Child index: owner/parent -> msgpack Vec of folder UUIDs
pub const FOLDER_CHILDREN: RecordTable = TableDefinition::new("folder_children");

/// File records: uuid -> FileRecord (msgpack)
pub const FILES: RecordTable = TableDefinition::new("files");

/// Placement index: owner/folder -> msgpack Vec of file UUIDs
pub const FOLDER_FILES: RecordTable = TableDefinition::new("folder_files");

/// Version records: uuid -> FileVersion (msgpack)
pub const FILE_VERSIONS: RecordTable = TableDefinition::new("file_versions");

/// Version index: file uuid -> msgpack Vec of version UUIDs (oldest first)
pub const FILE_VERSION_INDEX: RecordTable = TableDefinition::new("file_version_index");

/// Public shares: uuid -> ShareRecord (msgpack)
pub const SHARES: RecordTable = TableDefinition::new("shares");

/// Token index: token -> share uuid
pub const SHARE_TOKENS: LookupTable = TableDefinition::new("share_tokens");

/// File -> msgpack Vec of share UUIDs
pub const FILE_SHARES: RecordTable = TableDefinition::new("file_shares");

/// Direct grants: uuid -> UserShareRecord (msgpack)
pub const USER_SHARES: RecordTable = TableDefinition::new("user_shares");

/// Uniqueness index: file/recipient -> grant uuid
pub const USER_SHARE_PAIRS: LookupTable = TableDefinition::new("user_share_pairs");

/// Recipient -> msgpack Vec of grant UUIDs
pub const SHARED_WITH: RecordTable = TableDefinition::new("shared_with");

/// File -> msgpack Vec of grant UUIDs
pub const FILE_USER_SHARES: RecordTable = TableDefinition::new("file_user_shares");

/// Sync log: owner/zero-padded-micros/uuid -> SyncEventRecord (msgpack)
pub const SYNC_EVENTS: RecordTable = TableDefinition::new("sync_events");

/// Sessions: token -> SessionRecord (msgpack)
pub const SESSIONS: RecordTable = TableDefinition::new("sessions");

pub(crate) const ALL_RECORD_TABLES: [RecordTable; 13] = [
    FOLDERS,
    FOLDER_CHILDREN,
    FILES,
    FOLDER_FILES,
    FILE_VERSIONS,
    FILE_VERSION_INDEX,
    SHARES,
    FILE_SHARES,
    USER_SHARES,
    SHARED_WITH,
    FILE_USER_SHARES,
    SYNC_EVENTS,
    SESSIONS,
];

pub(crate) const ALL_LOOKUP_TABLES: [LookupTable; 3] = [FOLDER_NAMES, SHARE_TOKENS, USER_SHARE_PAIRS];

const SEP: char = '\u{1f}';

/// Key of the (owner, parent) scope; the root scope uses an empty parent.
pub(crate) fn scope_key(owner_id: &str, parent_id: Option<&str>) -> String {
    format!("{owner_id}{SEP}{}", parent_id.unwrap_or(""))
}

pub(crate) fn name_key(owner_id: &str, parent_id: Option<&str>, name: &str) -> String {
    format!("{}{SEP}{name}", scope_key(owner_id, parent_id))
}

pub(crate) fn pair_key(a: &str, b: &str) -> String {
    format!("{a}{SEP}{b}")
}

/// Sync log keys sort by owner, then creation time.
pub(crate) fn event_key(owner_id: &str, micros: i64, id: &str) -> String {
    format!("{owner_id}{SEP}{micros:020}{SEP}{id}")
}

pub(crate) fn event_prefix(owner_id: &str) -> String {
    format!("{owner_id}{SEP}")
}
