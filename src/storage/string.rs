use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use percent_encoding::percent_decode_str;

use crate::storage::error::{invalid_argument, StorageResult};

const PADDING_INDIFFERENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const BASE64: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, PADDING_INDIFFERENT);
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, PADDING_INDIFFERENT);

/// How the string passed to `upload_string` encodes its bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StringFormat {
    /// UTF-8 text.
    #[default]
    Raw,
    Base64,
    Base64Url,
    /// `data:[<mediatype>][;base64],<data>`; the media type becomes the default content type.
    DataUrl,
}

#[derive(Debug, PartialEq, Eq)]
pub struct StringPayload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

pub fn decode_string(value: &str, format: StringFormat) -> StorageResult<StringPayload> {
    let bytes = match format {
        StringFormat::Raw => value.as_bytes().to_vec(),
        StringFormat::Base64 => decode_with(&BASE64, value, "base64")?,
        StringFormat::Base64Url => decode_with(&BASE64_URL, value, "base64url")?,
        StringFormat::DataUrl => return decode_data_url(value),
    };
    Ok(StringPayload {
        bytes,
        content_type: None,
    })
}

fn decode_with(engine: &GeneralPurpose, value: &str, format: &str) -> StorageResult<Vec<u8>> {
    engine
        .decode(value.trim())
        .map_err(|err| invalid_argument(format!("String does not match format '{format}': {err}")))
}

fn decode_data_url(value: &str) -> StorageResult<StringPayload> {
    let rest = value
        .strip_prefix("data:")
        .ok_or_else(|| invalid_argument("String does not match format 'data_url': missing 'data:' prefix"))?;
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| invalid_argument("String does not match format 'data_url': missing ','"))?;

    let (media_type, is_base64) = match header.strip_suffix(";base64") {
        Some(media_type) => (media_type, true),
        None => (header, false),
    };
    let content_type = Some(media_type.trim())
        .filter(|media_type| !media_type.is_empty())
        .map(str::to_owned);

    let bytes = if is_base64 {
        decode_with(&BASE64, data, "data_url")?
    } else {
        percent_decode_str(data).collect()
    };
    Ok(StringPayload { bytes, content_type })
}
