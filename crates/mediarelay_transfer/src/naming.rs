use mediarelay_contract::DisplayName;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

const KEY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_');

// Keys are `{requested_at}_{escaped name}`. Escaping is injective, so distinct
// names never share a key; the same name within one second still does.
pub fn build_object_name(display_name: &DisplayName, requested_at: i64) -> String {
    format!(
        "{requested_at}_{}",
        utf8_percent_encode(&display_name.render(), KEY_ESCAPE)
    )
}
