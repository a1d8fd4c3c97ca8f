use powerlynx_protocol::{
    Command, FrameCollector, QueryResponse, decode_query_response, encode_query_response,
    encode_request, extract_payload, MAX_PAYLOAD, MAX_WIRE,
};

fn hexdump(label: &str, bytes: &[u8]) {
    println!("{} ({} bytes)", label, bytes.len());
    for (i, b) in bytes.iter().enumerate() {
        print!("{:02x} ", b);
        if (i + 1) % 16 == 0 {
            println!();
        }
    }
    println!();
}

fn main() {
    let req = encode_request(Command::Query).unwrap();
    hexdump("query request", &req);

    let resp = QueryResponse {
        v_in_mv: 12_000,
        v_out_setting_mv: 5_000,
        v_out_mv: 4_990,
        i_out_ma: 500,
        i_limit_ma: 1_000,
        power_enabled: true,
    };
    let wire = encode_query_response(&resp).unwrap();
    hexdump("query response", &wire);

    // Push the wire through the stream scanner the way the UART receive
    // path does, with some leading line noise.
    let mut collector: FrameCollector<MAX_WIRE> = FrameCollector::new();
    let mut stream = vec![0x00u8, 0x55, 0xAA];
    stream.extend_from_slice(&wire);
    for b in stream {
        if let Some(frame) = collector.push(b) {
            let mut payload = [0u8; MAX_PAYLOAD];
            let n = extract_payload(&frame, &mut payload).unwrap();
            hexdump("payload", &payload[..n]);
            let decoded = decode_query_response(&payload[..n]).unwrap();
            println!(
                "v_in {} mV, v_out {} mV (set {}), i_out {} mA, limit {} mA, enabled {}",
                decoded.v_in_mv,
                decoded.v_out_mv,
                decoded.v_out_setting_mv,
                decoded.i_out_ma,
                decoded.i_limit_ma,
                decoded.power_enabled
            );
        }
    }
}
