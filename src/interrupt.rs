//! Interrupt acknowledgement (§4.7): builds the machine states that realise
//! IM0/IM1/IM2 and NMI once the pipeline driver (§4.6) decides to inject one.

use crate::bus::AckBytes;
use crate::microcode::MicroOp;

/// Which acknowledge sequence `cpu::mod`'s pipeline-empty step should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    /// IM 0: the interrupting device feeds an opcode over the data bus.
    Mode0,
    /// IM 1: always RST 0x0038.
    Mode1,
    /// IM 2: vectored through the table at `(I << 8) | vector`.
    Mode2,
    Nmi,
}

/// Push the micro-ops for the chosen acknowledge sequence. `ack` feeds the
/// IM0 opcode byte / IM2 vector byte; unused for IM1 and NMI.
pub fn build(queue: &mut crate::microcode::MicroOpQueue, kind: AckKind, _ack: AckBytes) {
    log::trace!("building interrupt-acknowledge pipeline: {kind:?}");
    match kind {
        // IM0: the device drives an opcode; we reuse the OCF primitive with
        // its byte sourced from the ack producer instead of memory (handled
        // by `cpu::execute`'s OCF conclusion, which checks `pending_ack`).
        // Duration is whatever that decoded instruction costs, same as a
        // normal fetch (two extra T-states baked into the decode entry are
        // not modelled here since IM0 devices overwhelmingly drive a single
        // byte RST).
        AckKind::Mode0 => {
            queue.push(MicroOp::FetchOpcode { extra: 0 });
        }
        // IM1: push PC, jump to 0x0038. 13 T-states: 5 (ack) + 3 + 3 + 2.
        AckKind::Mode1 => {
            queue.push(MicroOp::Internal { ticks: 5 });
            queue.push(MicroOp::WriteStackHi { extra: 0 });
            queue.push(MicroOp::WriteStackLo { extra: 0 });
            queue.push(MicroOp::Internal { ticks: 2 });
            queue.push(MicroOp::Execute);
        }
        // IM2: push PC, fetch vector byte, read two-byte address from the
        // vector table. 19 T-states: 7 (ack + vector fetch) + 3 + 3 + 3 + 3.
        AckKind::Mode2 => {
            queue.push(MicroOp::Internal { ticks: 7 });
            queue.push(MicroOp::WriteStackHi { extra: 0 });
            queue.push(MicroOp::WriteStackLo { extra: 0 });
            queue.push(MicroOp::ReadMem16Lo);
            queue.push(MicroOp::ReadMem16Hi);
            queue.push(MicroOp::Execute);
        }
        // NMI: push PC, jump to 0x0066. 11 T-states: 5 + 3 + 3.
        AckKind::Nmi => {
            queue.push(MicroOp::Internal { ticks: 5 });
            queue.push(MicroOp::WriteStackHi { extra: 0 });
            queue.push(MicroOp::WriteStackLo { extra: 0 });
            queue.push(MicroOp::Execute);
        }
    }
}
