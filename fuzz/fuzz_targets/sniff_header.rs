#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // first byte picks the transport, the rest is the container
    let is_base64 = data[0] & 1 == 1;
    let container = &data[1..];

    let _ = blob_decrypt::inspect_symmetric(container, is_base64);

    let mut out = Vec::new();
    if let Ok(n) = blob_decrypt::decrypt_symmetric(container, &mut out, "hunter2", is_base64, None) {
        assert_eq!(n as usize, out.len());
    }
});
