//! Fuzz target: `MultipartDecoder::feed`
//!
//! The first input byte picks the read size, the rest is the request body.
//! The decoder must never panic, never forward more bytes than it was fed,
//! and never report completion without an `End` part.
//!
//! cargo fuzz run fuzz_multipart

#![no_main]

use libfuzzer_sys::fuzz_target;
use otadash::web::multipart::{MultipartDecoder, MultipartError, Part};

fuzz_target!(|data: &[u8]| {
    let Some((&step, body)) = data.split_first() else {
        return;
    };
    let step = usize::from(step).max(1);
    let Ok(mut decoder) = MultipartDecoder::new("fuzzBoundary") else {
        return;
    };

    let mut forwarded = 0usize;
    let mut ended = false;
    for chunk in body.chunks(step) {
        let fed = decoder.feed(chunk, &mut |part: Part<'_>| {
            match part {
                Part::Data(d) => forwarded += d.len(),
                Part::End => ended = true,
                Part::Start { .. } => {}
            }
            Ok::<(), MultipartError>(())
        });
        if fed.is_err() {
            return;
        }
    }

    assert!(forwarded <= body.len(), "forwarded more than the body");
    assert_eq!(decoder.is_complete(), ended);
    let _ = decoder.finish();
});
