//! Persisted key catalogue. Each key has exactly one owning component.

pub const ANKI_CONNECT_URL: &str = "anki_connect_url";
pub const ANKI_DECK: &str = "anki_deck";
pub const ANKI_NOTE_TYPE: &str = "anki_note_type";
pub const FIELD_MAPPINGS: &str = "fieldMappings";

pub const SUPABASE_SESSION: &str = "supabase_session";
pub const SUPABASE_URL: &str = "supabase_url";
pub const SUPABASE_ANON_KEY: &str = "supabase_anon_key";
pub const DEVICE_TOKEN: &str = "device_token";
/// Session blob written by releases that predate `supabase_session`.
pub const LEGACY_SESSION: &str = "session";

pub const NOTIFICATION_HISTORY: &str = "notification_history";
pub const EXTENSION_VERSION: &str = "extension_version";

pub const DEVICE_PAIRING_PENDING: &str = "device_pairing_pending";
pub const PAIRING_CODE: &str = "pairing_code";
pub const PENDING_NAVIGATION: &str = "pending_navigation";
pub const LAST_ROUTE: &str = "last_route";

pub const CREDENTIAL_KEYS: &[&str] =
    &[SUPABASE_SESSION, SUPABASE_URL, SUPABASE_ANON_KEY, DEVICE_TOKEN, LEGACY_SESSION];

pub const TRANSIENT_KEYS: &[&str] =
    &[DEVICE_PAIRING_PENDING, PAIRING_CODE, PENDING_NAVIGATION, LAST_ROUTE];
