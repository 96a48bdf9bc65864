pub(crate) const ICMP_HEADER_LEN: usize = 8;
pub(crate) const ECHO_PAYLOAD: [u8; 24] = *b"echo-prober/liveness/v1\0";
pub(crate) const ECHO_PACK_LEN: usize = ICMP_HEADER_LEN + ECHO_PAYLOAD.len();
pub(crate) const RECV_BUF_LEN: usize = 1500;
