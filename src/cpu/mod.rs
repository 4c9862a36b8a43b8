//! The Z80 CPU: register file, pipeline, and the public `clock()` step
//! (§4.6, §5). One call to `clock()` advances exactly one T-state.

mod execute;

use crate::bus::{AckBytes, Bus, IoBus};
use crate::error::{DecodeKey, Z80Error};
use crate::interrupt::{self, AckKind};
use crate::microcode::{MicroOp, MicroOpQueue};
use crate::registers::{Registers, ResetState};

/// A Z80 CPU core. Owns nothing but its own register file and in-flight
/// pipeline; memory and I/O are borrowed per `clock()` call (§5).
#[derive(Debug, Clone)]
pub struct Z80 {
    pub(crate) regs: Registers,
    queue: MicroOpQueue,
    current_remaining: u8,

    pub(crate) opcode: u8,
    /// 0, or 0xCB / 0xDD / 0xED / 0xFD.
    pub(crate) prefix: u8,
    /// 0xCB when decoding the DD-CB/FD-CB four-byte form, else 0.
    pub(crate) prefix2: u8,
    pub(crate) addr: u16,
    pub(crate) value_lo: u8,
    pub(crate) value_hi: u8,
    pub(crate) displacement: i8,
    pub(crate) followup_stage: u8,
    /// Decoded `y`/`z` bitfields (§4.4), cached across a deferred `Execute`.
    pub(crate) operand_y: u8,
    pub(crate) operand_z: u8,
    /// 0 = HL, 1 = IX, 2 = IY: which index register the current
    /// instruction's DD/FD prefix (if any) substitutes.
    pub(crate) index_reg: u8,

    pending_nmi: bool,
    pending_int: Option<AckBytes>,
    /// Set for the one OCF that is servicing an IM0 acknowledge: its opcode
    /// byte comes from the ack producer rather than memory.
    pending_ack_fetch: Option<AckBytes>,

    total_t_states: u64,
    last_key: Option<DecodeKey>,
    reset_state: ResetState,
}

impl Z80 {
    #[must_use]
    pub fn new() -> Self {
        Self::with_reset_state(ResetState::default())
    }

    #[must_use]
    pub fn with_reset_state(reset_state: ResetState) -> Self {
        let mut queue = MicroOpQueue::new();
        queue.push(MicroOp::FetchOpcode { extra: 0 });
        Self {
            regs: Registers::new(reset_state),
            queue,
            current_remaining: 0,
            opcode: 0,
            prefix: 0,
            prefix2: 0,
            addr: 0,
            value_lo: 0,
            value_hi: 0,
            displacement: 0,
            followup_stage: 0,
            operand_y: 0,
            operand_z: 0,
            index_reg: 0,
            pending_nmi: false,
            pending_int: None,
            pending_ack_fetch: None,
            total_t_states: 0,
            last_key: None,
            reset_state,
        }
    }

    pub fn reset(&mut self) {
        let reset_state = self.reset_state;
        *self = Self::with_reset_state(reset_state);
    }

    /// Advance by exactly one T-state (§4.6, §5).
    pub fn clock<B: Bus, I: IoBus>(&mut self, bus: &mut B, io: &mut I) -> Result<(), Z80Error> {
        self.clock_dyn(bus, io)
    }

    fn clock_dyn(&mut self, bus: &mut dyn Bus, io: &mut dyn IoBus) -> Result<(), Z80Error> {
        self.total_t_states += 1;
        log::trace!(
            "clock: head={:?}, t_states_remaining={}",
            self.queue.current(),
            self.current_remaining
        );

        loop {
            let Some(op) = self.queue.current() else {
                self.schedule_next()?;
                continue;
            };

            if op.t_states() == 0 {
                self.conclude(op, bus, io)?;
                self.queue.advance();
                continue;
            }

            if self.current_remaining == 0 {
                self.current_remaining = op.t_states();
            }
            self.current_remaining -= 1;
            if self.current_remaining == 0 {
                self.conclude(op, bus, io)?;
                self.queue.advance();
            }
            break;
        }
        Ok(())
    }

    /// Pipeline-empty step (§4.6 item 3-4): inject an interrupt-acknowledge
    /// pipeline if one is pending and accepted, otherwise a fresh fetch.
    fn schedule_next(&mut self) -> Result<(), Z80Error> {
        if self.pending_nmi {
            self.pending_nmi = false;
            self.regs.halted = false;
            self.regs.iff2 = self.regs.iff1;
            self.regs.iff1 = false;
            self.queue.clear();
            interrupt::build(&mut self.queue, AckKind::Nmi, AckBytes::empty());
            return Ok(());
        }

        if self.regs.iff1 {
            if let Some(ack) = self.pending_int.take() {
                self.regs.halted = false;
                self.regs.iff1 = false;
                self.regs.iff2 = false;
                self.queue.clear();
                match self.regs.im {
                    0 => {
                        self.pending_ack_fetch = Some(ack);
                        interrupt::build(&mut self.queue, AckKind::Mode0, ack);
                    }
                    2 => {
                        let mut ack = ack;
                        let vector = ack.next();
                        self.addr = (u16::from(self.regs.i) << 8) | u16::from(vector);
                        log::trace!("IM2 vector table address: {:#06X}", self.addr);
                        interrupt::build(&mut self.queue, AckKind::Mode2, ack);
                    }
                    _ => interrupt::build(&mut self.queue, AckKind::Mode1, ack),
                }
                return Ok(());
            }
        }

        if self.regs.halted {
            self.queue.clear();
            self.queue.push(MicroOp::Internal { ticks: 4 });
            return Ok(());
        }

        self.prefix = 0;
        self.prefix2 = 0;
        self.index_reg = 0;
        self.queue.clear();
        self.queue.push(MicroOp::FetchOpcode { extra: 0 });
        Ok(())
    }

    /// Latch an interrupt request (§6, §4.7). NMI wins if both are pending;
    /// the most recently latched maskable request otherwise.
    pub fn interrupt(&mut self, ack: AckBytes, nmi: bool) {
        if nmi {
            self.pending_nmi = true;
        } else {
            if self.pending_int.is_some() {
                log::warn!("maskable interrupt latched over an already-pending one");
            }
            self.pending_int = Some(ack);
        }
    }

    #[must_use]
    pub const fn registers(&self) -> &Registers {
        &self.regs
    }

    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.regs.pc
    }

    #[must_use]
    pub const fn sp(&self) -> u16 {
        self.regs.sp
    }

    #[must_use]
    pub const fn a(&self) -> u8 {
        self.regs.a
    }

    #[must_use]
    pub const fn bc(&self) -> u16 {
        self.regs.bc()
    }

    #[must_use]
    pub const fn de(&self) -> u16 {
        self.regs.de()
    }

    #[must_use]
    pub const fn hl(&self) -> u16 {
        self.regs.hl()
    }

    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.regs.halted
    }

    #[must_use]
    pub const fn total_t_states(&self) -> u64 {
        self.total_t_states
    }

    #[must_use]
    pub const fn last_decode_key(&self) -> Option<DecodeKey> {
        self.last_key
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "test-utils")]
impl Z80 {
    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    pub fn set_sp(&mut self, sp: u16) {
        self.regs.sp = sp;
    }

    pub fn set_a(&mut self, value: u8) {
        self.regs.a = value;
    }

    pub fn set_bc(&mut self, value: u16) {
        self.regs.set_bc(value);
    }

    pub fn set_de(&mut self, value: u16) {
        self.regs.set_de(value);
    }

    pub fn set_hl(&mut self, value: u16) {
        self.regs.set_hl(value);
    }

    pub fn set_f(&mut self, value: u8) {
        self.regs.f = value;
    }

    pub fn set_ix(&mut self, value: u16) {
        self.regs.ix = value;
    }

    pub fn set_iy(&mut self, value: u16) {
        self.regs.iy = value;
    }

    #[must_use]
    pub fn current_micro_op(&self) -> Option<MicroOp> {
        self.queue.current()
    }

    #[must_use]
    pub const fn t_state(&self) -> u8 {
        self.current_remaining
    }
}
