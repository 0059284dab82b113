// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Crate wlan-common hosts common libraries
//! to be used for WLAN SME, MLME, and binaries written in Rust.

pub mod channel;
pub mod mac;
pub mod p2p;

/// Asserts that `$e` matches the pattern `$p`, optionally evaluating `$tail` with the bindings of
/// the pattern in scope.
#[macro_export]
macro_rules! assert_variant {
    // Use custom formatting when panicking.
    ($test:expr, $variant:pat_param $( | $others:pat_param)* => $e:expr, $fmt:expr $(, $args:tt)* $(,)?) => {
        match $test {
            $variant $(| $others)* => $e,
            _ => panic!($fmt, $($args,)*),
        }
    };
    // Use default message when panicking.
    ($test:expr, $variant:pat_param $( | $others:pat_param)* => $e:expr $(,)?) => {
        match $test {
            $variant $(| $others)* => $e,
            other => panic!("unexpected variant: {:?}", other),
        }
    };
    // Custom error message.
    ($test:expr, $variant:pat_param $( | $others:pat_param)* , $fmt:expr $(, $args:tt)* $(,)?) => {
        $crate::assert_variant!($test, $variant $( | $others)* => {}, $fmt $(, $args)*)
    };
    // Default error message.
    ($test:expr, $variant:pat_param $( | $others:pat_param)* $(,)?) => {
        $crate::assert_variant!($test, $variant $( | $others)* => {})
    };
}

#[cfg(test)]
mod tests {
    #[derive(Debug)]
    enum Foo {
        A(u8),
        B { named: u8 },
        C,
    }

    #[test]
    fn assert_variant_full_match_success() {
        assert_variant!(Foo::A(8), Foo::A(8));
        assert_variant!(Foo::B { named: 7 }, Foo::B { named: 7 });
        assert_variant!(Foo::C, Foo::C);
    }

    #[test]
    fn assert_variant_binds_fields() {
        let value = assert_variant!(Foo::A(8), Foo::A(v) => v);
        assert_eq!(value, 8);
        let named = assert_variant!(Foo::B { named: 3 }, Foo::B { named } => named);
        assert_eq!(named, 3);
    }

    #[test]
    fn assert_variant_multiple_patterns() {
        assert_variant!(Foo::C, Foo::A(_) | Foo::C);
    }

    #[test]
    #[should_panic(expected = "unexpected variant")]
    fn assert_variant_failure() {
        assert_variant!(Foo::A(8), Foo::C);
    }

    #[test]
    #[should_panic(expected = "custom 42")]
    fn assert_variant_custom_message() {
        assert_variant!(Foo::A(8), Foo::C, "custom {}", 42);
    }
}
