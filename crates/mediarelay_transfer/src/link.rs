use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS, NON_ALPHANUMERIC};

const NAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

// Only what would end or split the query value; a plain URL passes unchanged.
const SRC_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>');

pub fn build_link(base_web_app_url: &str, raw_storage_url: &str, display_name: &str) -> String {
    format!(
        "{}/?src={}&name={}",
        base_web_app_url.trim_end_matches('/'),
        utf8_percent_encode(raw_storage_url, SRC_ESCAPE),
        utf8_percent_encode(display_name, NAME_ESCAPE)
    )
}
