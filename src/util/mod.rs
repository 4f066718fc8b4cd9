// Copyright 2016 PingCAP, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

#[macro_use]
pub mod time;

/// Renders a byte slice for log messages the way `util::escape` does:
/// printable ASCII passes through, everything else is hex-escaped.
pub fn escape(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        if b == b'\\' {
            out.push_str("\\\\");
        } else if (0x20..0x7f).contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_passes_through_printable() {
        assert_eq!(escape(b"hello"), "hello");
    }

    #[test]
    fn escape_hex_encodes_binary() {
        assert_eq!(escape(&[0u8, 1, 255]), "\\x00\\x01\\xff");
    }
}
