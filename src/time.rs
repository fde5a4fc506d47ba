//! Platform-agnostic time utilities
//!
//! chrono reads the browser clock through `wasmbind` on WASM.

use chrono::Local;

/// Local wall-clock time in the format the server uses for `formatted_time`
pub fn formatted_now() -> String {
    Local::now().format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formatted_now_shape() {
        let now = formatted_now();
        assert_eq!(now.len(), 16);
        assert_eq!(&now[4..5], "-");
        assert_eq!(&now[13..14], ":");
    }
}
