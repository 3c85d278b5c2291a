// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Small CBOR helpers shared by the RPC endpoints.

use super::{Result, RpcError};
use minicbor::data::Type;
use minicbor::Decoder;

/// Verify that `payload` holds exactly one well-formed CBOR item.
pub fn validate_single_item(payload: &[u8]) -> Result<()> {
    let mut d = Decoder::new(payload);
    d.skip()?;
    if d.position() != payload.len() {
        return Err(RpcError::Cbor(format!(
            "trailing bytes after CBOR item ({} of {})",
            d.position(),
            payload.len()
        )));
    }
    Ok(())
}

/// Look up a text value by key in a CBOR map.
///
/// Returns `None` when the key is absent. Fails when the item is not a map or
/// the key's value is not a text string.
pub fn map_get_text(payload: &[u8], wanted: &str) -> Result<Option<String>> {
    let mut d = Decoder::new(payload);

    if d.datatype()? != Type::Map {
        return Err(RpcError::InvalidRequest(format!(
            "expected CBOR map, got {}",
            d.datatype()?
        )));
    }
    let Some(len) = d.map()? else {
        return Err(RpcError::InvalidRequest(
            "indefinite-length maps not supported".into(),
        ));
    };

    for _ in 0..len {
        if d.datatype()? == Type::String {
            let key = d.str()?.to_string();
            if key == wanted {
                if d.datatype()? != Type::String {
                    return Err(RpcError::InvalidRequest(format!(
                        "expected string value for `{wanted}`"
                    )));
                }
                return Ok(Some(d.str()?.to_string()));
            }
            d.skip()?;
        } else {
            d.skip()?; // non-text key
            d.skip()?;
        }
    }

    Ok(None)
}
