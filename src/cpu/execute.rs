//! Opcode decode and dispatch (§4.4). Every unprefixed, CB-, ED-, DD/FD- and
//! DD-CB/FD-CB-prefixed opcode is decomposed into the `x`/`y`/`z` (and, for
//! the register-pair rows, `p`/`q`) bitfields of the well-known Z80 decoding
//! scheme rather than a 2000-entry literal table. A decode entry either
//! applies its effect immediately (pure-register ops need no further bus
//! cycle) or queues the machine states §4.2 calls for and finishes with a
//! zero-duration `Execute`, whose handler reads back the scratch fields
//! (`value_lo`, `value_hi`, `addr`, `displacement`) the queued states filled
//! in. `followup_stage` disambiguates the rare instruction that needs a
//! second `Execute` hop (CALL's push-then-jump, `LD rr,(nn)`'s
//! address-then-load, a repeating block instruction's own re-dispatch).

use crate::alu;
use crate::bus::{Bus, IoBus};
use crate::error::{DecodeKey, Z80Error};
use crate::flags::{parity, sz53, sz53p, CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::microcode::MicroOp;

use super::Z80;

impl Z80 {
    pub(super) fn conclude(
        &mut self,
        op: MicroOp,
        bus: &mut dyn Bus,
        io: &mut dyn IoBus,
    ) -> Result<(), Z80Error> {
        match op {
            MicroOp::FetchOpcode { .. } => self.on_fetch_opcode_conclude(bus)?,
            MicroOp::FetchDisplacement => {
                let byte = bus.read(self.regs.pc);
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.displacement = byte as i8;
                if self.index_reg != 0 {
                    self.addr = self.hl_like().wrapping_add(i16::from(self.displacement) as u16);
                    self.regs.wz = self.addr;
                }
            }
            MicroOp::ReadImm8 | MicroOp::ReadImm16Lo => {
                self.value_lo = bus.read(self.regs.pc);
                self.regs.pc = self.regs.pc.wrapping_add(1);
            }
            MicroOp::ReadImm16Hi => {
                self.value_hi = bus.read(self.regs.pc);
                self.regs.pc = self.regs.pc.wrapping_add(1);
            }
            MicroOp::ReadMem => self.value_lo = bus.read(self.addr),
            MicroOp::ReadMem16Lo => {
                self.value_lo = bus.read(self.addr);
                self.addr = self.addr.wrapping_add(1);
            }
            MicroOp::ReadMem16Hi => self.value_hi = bus.read(self.addr),
            MicroOp::WriteMem { .. } => bus.write(self.addr, self.value_lo),
            MicroOp::WriteMem16Lo => {
                bus.write(self.addr, self.value_lo);
                self.addr = self.addr.wrapping_add(1);
            }
            MicroOp::WriteMem16Hi => bus.write(self.addr, self.value_hi),
            MicroOp::WriteStackHi { .. } => {
                self.regs.sp = self.regs.sp.wrapping_sub(1);
                bus.write(self.regs.sp, self.value_hi);
            }
            MicroOp::WriteStackLo { .. } => {
                self.regs.sp = self.regs.sp.wrapping_sub(1);
                bus.write(self.regs.sp, self.value_lo);
            }
            MicroOp::ReadStackLo { .. } => {
                self.value_lo = bus.read(self.regs.sp);
                self.regs.sp = self.regs.sp.wrapping_add(1);
            }
            MicroOp::ReadStackHi { .. } => {
                self.value_hi = bus.read(self.regs.sp);
                self.regs.sp = self.regs.sp.wrapping_add(1);
            }
            MicroOp::IoRead => {
                let (port, high) = (self.addr as u8, (self.addr >> 8) as u8);
                self.value_lo = io.read(port, high);
            }
            MicroOp::IoWrite => {
                let (port, high) = (self.addr as u8, (self.addr >> 8) as u8);
                io.write(port, high, self.value_lo);
            }
            MicroOp::Internal { .. } => {}
            MicroOp::Execute => self.execute_followup(bus, io)?,
        }
        Ok(())
    }

    fn inc_r(&mut self) {
        self.regs.r = (self.regs.r & 0x80) | (self.regs.r.wrapping_add(1) & 0x7F);
    }

    /// The "HL position" for the currently decoding instruction, substituted
    /// with IX/IY under a DD/FD prefix.
    const fn hl_like(&self) -> u16 {
        match self.index_reg {
            1 => self.regs.ix,
            2 => self.regs.iy,
            _ => self.regs.hl(),
        }
    }

    fn set_hl_like(&mut self, value: u16) {
        match self.index_reg {
            1 => self.regs.ix = value,
            2 => self.regs.iy = value,
            _ => self.regs.set_hl(value),
        }
    }

    /// Register-direct operand fetch for the `z`/`y` fields of the main and
    /// CB opcode tables. Substitutes IXH/IXL or IYH/IYL for H/L under a
    /// DD/FD prefix. `field == 6` ((HL) / value already read into
    /// `value_lo`) is valid only after the caller has queued a `ReadMem`.
    fn r8_get(&self, field: u8) -> u8 {
        match field {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => match self.index_reg {
                1 => self.regs.ixh(),
                2 => self.regs.iyh(),
                _ => self.regs.h,
            },
            5 => match self.index_reg {
                1 => self.regs.ixl(),
                2 => self.regs.iyl(),
                _ => self.regs.l,
            },
            6 => self.value_lo,
            _ => self.regs.a,
        }
    }

    fn r8_set(&mut self, field: u8, value: u8) {
        match field {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => match self.index_reg {
                1 => self.regs.set_ixh(value),
                2 => self.regs.set_iyh(value),
                _ => self.regs.h = value,
            },
            5 => match self.index_reg {
                1 => self.regs.set_ixl(value),
                2 => self.regs.set_iyl(value),
                _ => self.regs.l = value,
            },
            6 => self.value_lo = value,
            _ => self.regs.a = value,
        }
    }

    /// Register fetch that never substitutes IXH/IXL or IYH/IYL — used for
    /// the register operand of `LD (IX+d),r`, where the memory slot has
    /// already consumed the index substitution and real hardware leaves the
    /// other operand referring to plain H/L.
    fn r8_get_plain(&self, field: u8) -> u8 {
        match field {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            6 => self.value_lo,
            _ => self.regs.a,
        }
    }

    /// Register store that never substitutes IXH/IXL or IYH/IYL — the
    /// DD-CB/FD-CB "also store to register z" quirk always targets the
    /// plain register, unlike every other `r8_set` use site.
    fn r8_set_plain(&mut self, field: u8, value: u8) {
        match field {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            6 => self.value_lo = value,
            _ => self.regs.a = value,
        }
    }

    fn rp_get(&self, p: u8) -> u16 {
        match p {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.hl_like(),
            _ => self.regs.sp,
        }
    }

    fn rp_set(&mut self, p: u8, value: u16) {
        match p {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_hl_like(value),
            _ => self.regs.sp = value,
        }
    }

    fn rp2_get(&self, p: u8) -> u16 {
        match p {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.hl_like(),
            _ => self.regs.af(),
        }
    }

    fn rp2_set(&mut self, p: u8, value: u16) {
        match p {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_hl_like(value),
            _ => self.regs.set_af(value),
        }
    }

    fn cc_test(&self, y: u8) -> bool {
        match y {
            0 => !self.regs.getflag(b'Z'),
            1 => self.regs.getflag(b'Z'),
            2 => !self.regs.getflag(b'C'),
            3 => self.regs.getflag(b'C'),
            4 => !self.regs.getflag(b'P'),
            5 => self.regs.getflag(b'P'),
            6 => !self.regs.getflag(b'S'),
            _ => self.regs.getflag(b'S'),
        }
    }

    fn apply_alu(&mut self, y: u8, operand: u8) {
        let carry = self.regs.getflag(b'C');
        let result = match y {
            0 => alu::add8(self.regs.a, operand, false),
            1 => alu::add8(self.regs.a, operand, carry),
            2 => alu::sub8(self.regs.a, operand, false),
            3 => alu::sub8(self.regs.a, operand, carry),
            4 => alu::and8(self.regs.a, operand),
            5 => alu::xor8(self.regs.a, operand),
            6 => alu::or8(self.regs.a, operand),
            _ => alu::cp8(self.regs.a, operand),
        };
        self.regs.f = result.flags;
        if y != 7 {
            self.regs.a = result.value;
        }
    }

    fn apply_rot(&mut self, y: u8, value: u8) -> u8 {
        let carry = self.regs.getflag(b'C');
        let result = match y {
            0 => alu::rlc8(value),
            1 => alu::rrc8(value),
            2 => alu::rl8(value, carry),
            3 => alu::rr8(value, carry),
            4 => alu::sla8(value),
            5 => alu::sra8(value),
            6 => alu::sll8(value),
            _ => alu::srl8(value),
        };
        self.regs.f = result.flags;
        result.value
    }

    /// BIT n, value flags (§9: register-direct forms source 5/3 from the
    /// tested value; `(HL)`/`(IX+d)`/`(IY+d)` forms source them from WZ).
    fn bit_flags(&self, y: u8, value: u8, undoc_source: u8) -> u8 {
        let bit_set = value & (1 << y) != 0;
        let mut f = self.regs.f & CF;
        f |= HF;
        if !bit_set {
            f |= ZF | PF;
        }
        if y == 7 && bit_set {
            f |= SF;
        }
        f | (undoc_source & (YF | XF))
    }

    // ------------------------------------------------------------------
    // OCF conclusion: prefix tracking and top-level decode routing.
    // ------------------------------------------------------------------

    fn on_fetch_opcode_conclude(&mut self, bus: &mut dyn Bus) -> Result<(), Z80Error> {
        let byte = if let Some(mut ack) = self.pending_ack_fetch.take() {
            ack.next()
        } else {
            let b = bus.read(self.regs.pc);
            self.regs.pc = self.regs.pc.wrapping_add(1);
            self.inc_r();
            b
        };

        if self.prefix == 0xCB {
            self.opcode = byte;
            self.followup_stage = 0;
            self.last_key = Some(DecodeKey::Prefixed(0xCB, byte));
            self.decode_cb(byte);
            log::debug!(
                "OCF concluded: key={}, pipeline depth {}",
                self.last_key.unwrap(),
                self.queue.pending_len()
            );
            return Ok(());
        }
        if self.prefix == 0xED {
            self.opcode = byte;
            self.followup_stage = 0;
            self.last_key = Some(DecodeKey::Prefixed(0xED, byte));
            self.decode_ed(byte);
            log::debug!(
                "OCF concluded: key={}, pipeline depth {}",
                self.last_key.unwrap(),
                self.queue.pending_len()
            );
            return Ok(());
        }
        if self.prefix == 0xDD || self.prefix == 0xFD {
            match byte {
                0xCB => {
                    self.prefix2 = 0xCB;
                    self.followup_stage = 0;
                    self.queue.push(MicroOp::FetchDisplacement);
                    self.queue.push(MicroOp::Internal { ticks: 3 });
                    self.queue.push(MicroOp::ReadImm8);
                    self.queue.push(MicroOp::Execute);
                }
                0xDD => {
                    self.prefix = 0xDD;
                    self.index_reg = 1;
                    self.queue.push(MicroOp::FetchOpcode { extra: 0 });
                }
                0xFD => {
                    self.prefix = 0xFD;
                    self.index_reg = 2;
                    self.queue.push(MicroOp::FetchOpcode { extra: 0 });
                }
                _ => {
                    self.opcode = byte;
                    self.followup_stage = 0;
                    self.last_key = Some(DecodeKey::Prefixed(self.prefix, byte));
                    self.decode_dd_fd(byte);
                    log::debug!(
                        "OCF concluded: key={}, pipeline depth {}",
                        self.last_key.unwrap(),
                        self.queue.pending_len()
                    );
                }
            }
            return Ok(());
        }

        match byte {
            0xCB => {
                self.prefix = 0xCB;
                self.queue.push(MicroOp::FetchOpcode { extra: 0 });
            }
            0xDD => {
                self.prefix = 0xDD;
                self.index_reg = 1;
                self.queue.push(MicroOp::FetchOpcode { extra: 0 });
            }
            0xED => {
                self.prefix = 0xED;
                self.queue.push(MicroOp::FetchOpcode { extra: 0 });
            }
            0xFD => {
                self.prefix = 0xFD;
                self.index_reg = 2;
                self.queue.push(MicroOp::FetchOpcode { extra: 0 });
            }
            _ => {
                self.opcode = byte;
                self.followup_stage = 0;
                self.last_key = Some(DecodeKey::Byte(byte));
                self.decode_unprefixed(byte);
                log::debug!(
                    "OCF concluded: key={}, pipeline depth {}",
                    self.last_key.unwrap(),
                    self.queue.pending_len()
                );
            }
        }
        Ok(())
    }

    fn execute_followup(&mut self, bus: &mut dyn Bus, io: &mut dyn IoBus) -> Result<(), Z80Error> {
        if self.prefix2 == 0xCB {
            self.execute_ddcb_fdcb();
            return Ok(());
        }
        match self.prefix {
            0xCB => self.execute_cb(),
            0xED => self.execute_ed(io),
            0xDD | 0xFD => self.execute_dd_fd(),
            _ => self.execute_plain(),
        }
        let _ = bus;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Unprefixed table (§4.4): x/y/z decomposition.
    // ------------------------------------------------------------------

    fn decode_unprefixed(&mut self, opcode: u8) {
        let x = (opcode >> 6) & 3;
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;
        self.operand_y = y;
        self.operand_z = z;

        match (x, z) {
            (0, 0) => self.decode_x0z0(y),
            (0, 1) => {
                if y & 1 == 0 {
                    self.queue.push(MicroOp::ReadImm16Lo);
                    self.queue.push(MicroOp::ReadImm16Hi);
                    self.queue.push(MicroOp::Execute);
                } else {
                    self.queue.push(MicroOp::Internal { ticks: 7 });
                    self.queue.push(MicroOp::Execute);
                }
            }
            (0, 2) => self.decode_x0z2(y),
            (0, 3) => {
                let p = y >> 1;
                let v = if y & 1 == 0 {
                    self.rp_get(p).wrapping_add(1)
                } else {
                    self.rp_get(p).wrapping_sub(1)
                };
                self.rp_set(p, v);
                self.queue.push(MicroOp::Internal { ticks: 2 });
            }
            (0, 4 | 5) => self.decode_inc_dec_r(y, z == 5),
            (0, 6) => {
                self.queue.push(MicroOp::ReadImm8);
                if y == 6 {
                    self.addr = self.regs.hl();
                    self.queue.push(MicroOp::WriteMem { extra: 0 });
                } else {
                    self.queue.push(MicroOp::Execute);
                }
            }
            (0, 7) => self.apply_accumulator_op(y),
            (1, _) => {
                if opcode == 0x76 {
                    self.regs.halted = true;
                    return;
                }
                self.decode_ld_r_r(y, z);
            }
            (2, _) => {
                if z == 6 {
                    self.addr = self.regs.hl();
                    self.queue.push(MicroOp::ReadMem);
                    self.queue.push(MicroOp::Execute);
                } else {
                    let v = self.r8_get(z);
                    self.apply_alu(y, v);
                }
            }
            (3, 0) => {
                self.queue.push(MicroOp::Internal { ticks: 1 });
                if self.cc_test(y) {
                    self.queue.push(MicroOp::ReadStackLo { extra: 0 });
                    self.queue.push(MicroOp::ReadStackHi { extra: 0 });
                    self.queue.push(MicroOp::Execute);
                }
            }
            (3, 1) => self.decode_x3z1(y),
            (3, 2) => {
                self.queue.push(MicroOp::ReadImm16Lo);
                self.queue.push(MicroOp::ReadImm16Hi);
                self.queue.push(MicroOp::Execute);
            }
            (3, 3) => self.decode_x3z3(y),
            (3, 4) => {
                self.queue.push(MicroOp::ReadImm16Lo);
                self.queue.push(MicroOp::ReadImm16Hi);
                self.queue.push(MicroOp::Execute);
            }
            (3, 5) => self.decode_x3z5(y),
            (3, 6) => {
                self.queue.push(MicroOp::ReadImm8);
                self.queue.push(MicroOp::Execute);
            }
            _ => {
                // RST y*8.
                self.value_hi = (self.regs.pc >> 8) as u8;
                self.value_lo = self.regs.pc as u8;
                self.queue.push(MicroOp::Internal { ticks: 1 });
                self.queue.push(MicroOp::WriteStackHi { extra: 0 });
                self.queue.push(MicroOp::WriteStackLo { extra: 0 });
                self.queue.push(MicroOp::Execute);
            }
        }
    }

    fn decode_x0z0(&mut self, y: u8) {
        match y {
            0 => {} // NOP
            1 => self.regs.ex(),
            2 => {
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.queue.push(MicroOp::Internal { ticks: 1 });
                self.queue.push(MicroOp::FetchDisplacement);
                if self.regs.b != 0 {
                    self.queue.push(MicroOp::Internal { ticks: 5 });
                    self.queue.push(MicroOp::Execute);
                }
            }
            3 => {
                self.queue.push(MicroOp::FetchDisplacement);
                self.queue.push(MicroOp::Internal { ticks: 5 });
                self.queue.push(MicroOp::Execute);
            }
            _ => {
                self.queue.push(MicroOp::FetchDisplacement);
                if self.cc_test(y - 4) {
                    self.queue.push(MicroOp::Internal { ticks: 5 });
                    self.queue.push(MicroOp::Execute);
                }
            }
        }
    }

    /// `LD (BC)/(DE),A`, `LD A,(BC)/(DE)`, `LD (nn),HL`, `LD HL,(nn)`,
    /// `LD (nn),A`, `LD A,(nn)` (§4.4's `z == 2` row: `q = y & 1`, `p = y >> 1`).
    fn decode_x0z2(&mut self, y: u8) {
        let p = y >> 1;
        let store = y & 1 == 0;
        match (p, store) {
            (0, true) => {
                self.addr = self.regs.bc();
                self.value_lo = self.regs.a;
                self.regs.wz = (u16::from(self.regs.a) << 8) | (self.addr.wrapping_add(1) & 0xFF);
                self.queue.push(MicroOp::WriteMem { extra: 0 });
            }
            (0, false) => {
                self.addr = self.regs.bc();
                self.regs.wz = self.addr.wrapping_add(1);
                self.queue.push(MicroOp::ReadMem);
                self.queue.push(MicroOp::Execute);
            }
            (1, true) => {
                self.addr = self.regs.de();
                self.value_lo = self.regs.a;
                self.regs.wz = (u16::from(self.regs.a) << 8) | (self.addr.wrapping_add(1) & 0xFF);
                self.queue.push(MicroOp::WriteMem { extra: 0 });
            }
            (1, false) => {
                self.addr = self.regs.de();
                self.regs.wz = self.addr.wrapping_add(1);
                self.queue.push(MicroOp::ReadMem);
                self.queue.push(MicroOp::Execute);
            }
            _ => {
                self.queue.push(MicroOp::ReadImm16Lo);
                self.queue.push(MicroOp::ReadImm16Hi);
                self.queue.push(MicroOp::Execute);
            }
        }
    }

    fn decode_inc_dec_r(&mut self, y: u8, dec: bool) {
        if y == 6 {
            self.addr = self.regs.hl();
            self.queue.push(MicroOp::ReadMem);
            self.queue.push(MicroOp::Execute);
            self.queue.push(MicroOp::Internal { ticks: 1 });
            self.queue.push(MicroOp::WriteMem { extra: 0 });
        } else {
            let v = self.r8_get(y);
            let r = if dec { alu::dec8(v) } else { alu::inc8(v) };
            self.regs.f = r.flags;
            self.r8_set(y, r.value);
        }
    }

    fn apply_accumulator_op(&mut self, y: u8) {
        match y {
            0 => {
                let r = alu::rlc8(self.regs.a);
                self.regs.a = r.value;
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | (r.flags & (YF | HF | XF | NF | CF));
            }
            1 => {
                let r = alu::rrc8(self.regs.a);
                self.regs.a = r.value;
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | (r.flags & (YF | HF | XF | NF | CF));
            }
            2 => {
                let r = alu::rl8(self.regs.a, self.regs.getflag(b'C'));
                self.regs.a = r.value;
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | (r.flags & (YF | HF | XF | NF | CF));
            }
            3 => {
                let r = alu::rr8(self.regs.a, self.regs.getflag(b'C'));
                self.regs.a = r.value;
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | (r.flags & (YF | HF | XF | NF | CF));
            }
            4 => {
                let r = alu::daa(
                    self.regs.a,
                    self.regs.getflag(b'C'),
                    self.regs.getflag(b'H'),
                    self.regs.getflag(b'N'),
                );
                self.regs.a = r.value;
                self.regs.f = r.flags;
            }
            5 => {
                let r = alu::cpl8(self.regs.a);
                self.regs.a = r.value;
                self.regs.f = (self.regs.f & (SF | ZF | PF | CF)) | (r.flags & (HF | XF | NF | YF));
            }
            6 => self.regs.f = (self.regs.f & (SF | ZF | PF)) | alu::scf(self.regs.a),
            _ => {
                let old_carry = self.regs.getflag(b'C');
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | alu::ccf(self.regs.a, old_carry);
            }
        }
    }

    fn decode_ld_r_r(&mut self, y: u8, z: u8) {
        match (y == 6, z == 6) {
            (false, false) => {
                let v = self.r8_get(z);
                self.r8_set(y, v);
            }
            (false, true) => {
                self.addr = self.regs.hl();
                self.queue.push(MicroOp::ReadMem);
                self.queue.push(MicroOp::Execute);
            }
            (true, false) => {
                self.addr = self.regs.hl();
                self.value_lo = self.r8_get(z);
                self.queue.push(MicroOp::WriteMem { extra: 0 });
            }
            (true, true) => unreachable!("0x76 is HALT, excluded by the caller"),
        }
    }

    fn decode_x3z1(&mut self, y: u8) {
        let p = y >> 1;
        if y & 1 == 0 {
            self.queue.push(MicroOp::ReadStackLo { extra: 0 });
            self.queue.push(MicroOp::ReadStackHi { extra: 0 });
            self.queue.push(MicroOp::Execute);
            return;
        }
        match p {
            0 => {
                self.queue.push(MicroOp::ReadStackLo { extra: 0 });
                self.queue.push(MicroOp::ReadStackHi { extra: 0 });
                self.queue.push(MicroOp::Execute);
            }
            1 => self.regs.exx(),
            2 => self.regs.pc = self.hl_like(),
            _ => {
                self.regs.sp = self.hl_like();
                self.queue.push(MicroOp::Internal { ticks: 2 });
            }
        }
    }

    fn decode_x3z3(&mut self, y: u8) {
        match y {
            0 => {
                self.queue.push(MicroOp::ReadImm16Lo);
                self.queue.push(MicroOp::ReadImm16Hi);
                self.queue.push(MicroOp::Execute);
            }
            2 | 3 => {
                self.queue.push(MicroOp::ReadImm8);
                self.queue.push(MicroOp::Execute);
            }
            4 => {
                self.addr = self.regs.sp;
                self.queue.push(MicroOp::ReadStackLo { extra: 0 });
                self.queue.push(MicroOp::ReadStackHi { extra: 0 });
                self.queue.push(MicroOp::Execute);
                self.queue.push(MicroOp::Internal { ticks: 1 });
                self.queue.push(MicroOp::WriteStackHi { extra: 0 });
                self.queue.push(MicroOp::WriteStackLo { extra: 2 });
            }
            5 => self.regs.ex_de_hl(),
            6 => self.regs.iff1 = false,
            _ => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
            }
        }
    }

    fn decode_x3z5(&mut self, y: u8) {
        let p = y >> 1;
        if y & 1 == 0 {
            self.value_hi = (self.rp2_get(p) >> 8) as u8;
            self.value_lo = self.rp2_get(p) as u8;
            self.queue.push(MicroOp::Internal { ticks: 1 });
            self.queue.push(MicroOp::WriteStackHi { extra: 0 });
            self.queue.push(MicroOp::WriteStackLo { extra: 0 });
        } else if p == 0 {
            self.queue.push(MicroOp::ReadImm16Lo);
            self.queue.push(MicroOp::ReadImm16Hi);
            self.queue.push(MicroOp::Execute);
        }
        // p == 1, 2, 3 are the CB/ED/FD prefixes, already intercepted earlier.
    }

    #[allow(clippy::too_many_lines)]
    fn execute_plain(&mut self) {
        let opcode = self.opcode;
        let x = (opcode >> 6) & 3;
        let y = self.operand_y;
        let z = self.operand_z;
        let addr16 = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);

        match (x, z) {
            (0, 0) => {
                self.regs.pc = self.regs.pc.wrapping_add(i16::from(self.displacement) as u16);
                self.regs.wz = self.regs.pc;
            }
            (0, 1) => {
                let p = y >> 1;
                if y & 1 == 0 {
                    self.rp_set(p, addr16);
                } else {
                    let a = self.rp_get(p);
                    let hl = self.hl_like();
                    let (result, flags) = alu::add16(hl, a);
                    self.set_hl_like(result);
                    self.regs.f = (self.regs.f & (SF | ZF | PF)) | (flags & (YF | HF | XF | NF | CF));
                    self.regs.wz = hl.wrapping_add(1);
                }
            }
            (0, 2) => self.execute_x0z2(y),
            (0, 4 | 5) => {
                let dec = z == 5;
                let r = if dec { alu::dec8(self.value_lo) } else { alu::inc8(self.value_lo) };
                self.regs.f = r.flags;
                self.value_lo = r.value;
            }
            (0, 6) => self.r8_set(y, self.value_lo),
            (2, _) => self.apply_alu(y, self.value_lo),
            (3, 0) => {
                self.regs.pc = addr16;
                self.regs.wz = self.regs.pc;
            }
            (3, 1) => {
                if y & 1 == 0 {
                    self.rp2_set(y >> 1, addr16);
                } else {
                    // y == 1: RET (the only other `(3, 1)` opcode that
                    // queues an `Execute`; EXX/`JP (HL)`/`LD SP,HL` apply
                    // immediately at decode time).
                    self.regs.pc = addr16;
                    self.regs.wz = addr16;
                }
            }
            (3, 2) => {
                self.regs.wz = addr16;
                if self.cc_test(y) {
                    self.regs.pc = addr16;
                }
            }
            (3, 3) => self.execute_x3z3(y, addr16),
            (3, 4 | 5) => self.execute_call(opcode, y, addr16),
            (3, 6) => self.apply_alu(y, self.value_lo),
            _ if opcode & 0xC7 == 0xC7 => {
                self.regs.pc = u16::from(y) * 8;
                self.regs.wz = self.regs.pc;
            }
            _ => {}
        }
    }

    fn execute_x0z2(&mut self, y: u8) {
        if self.followup_stage == 1 {
            if y == 5 {
                let v = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                self.regs.set_hl(v);
            } else if y == 7 {
                self.regs.a = self.value_lo;
            }
            self.followup_stage = 0;
            return;
        }
        let p = y >> 1;
        let store = y & 1 == 0;
        if p < 2 {
            if !store {
                self.regs.a = self.value_lo;
            }
            return;
        }
        let target = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
        self.addr = target;
        match (p, store) {
            (2, true) => {
                self.regs.wz = target.wrapping_add(1);
                let hl = self.regs.hl();
                self.value_lo = hl as u8;
                self.value_hi = (hl >> 8) as u8;
                self.queue.push(MicroOp::WriteMem16Lo);
                self.queue.push(MicroOp::WriteMem16Hi);
            }
            (2, false) => {
                self.regs.wz = target.wrapping_add(1);
                self.queue.push(MicroOp::ReadMem16Lo);
                self.queue.push(MicroOp::ReadMem16Hi);
                self.queue.push(MicroOp::Execute);
                self.followup_stage = 1;
            }
            (_, true) => {
                self.regs.wz = (u16::from(self.regs.a) << 8) | (target.wrapping_add(1) & 0xFF);
                self.value_lo = self.regs.a;
                self.queue.push(MicroOp::WriteMem { extra: 0 });
            }
            (_, false) => {
                self.regs.wz = target.wrapping_add(1);
                self.queue.push(MicroOp::ReadMem);
                self.queue.push(MicroOp::Execute);
                self.followup_stage = 1;
            }
        }
    }

    fn execute_x3z3(&mut self, y: u8, addr16: u16) {
        if self.followup_stage == 1 {
            // IN A,(n) landing: IN A,(n) does not affect flags.
            self.regs.a = self.value_lo;
            self.followup_stage = 0;
            return;
        }
        match y {
            0 => {
                self.regs.wz = addr16;
                self.regs.pc = addr16;
            }
            2 => {
                self.addr = (u16::from(self.regs.a) << 8) | u16::from(self.value_lo);
                self.regs.wz =
                    (u16::from(self.regs.a) << 8) | (u16::from(self.value_lo).wrapping_add(1) & 0xFF);
                self.value_lo = self.regs.a;
                self.queue.push(MicroOp::IoWrite);
            }
            3 => {
                self.addr = (u16::from(self.regs.a) << 8) | u16::from(self.value_lo);
                self.regs.wz = self.addr.wrapping_add(1);
                self.queue.push(MicroOp::IoRead);
                self.queue.push(MicroOp::Execute);
                self.followup_stage = 1;
            }
            _ => {
                // y == 4: EX (SP),HL.
                let old_hl = self.regs.hl();
                let popped = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                self.regs.set_hl(popped);
                self.regs.wz = popped;
                self.value_hi = (old_hl >> 8) as u8;
                self.value_lo = old_hl as u8;
            }
        }
    }

    fn execute_call(&mut self, opcode: u8, y: u8, addr16: u16) {
        if self.followup_stage == 1 {
            self.regs.pc = self.addr;
            self.followup_stage = 0;
            return;
        }
        self.regs.wz = addr16;
        let take = opcode == 0xCD || self.cc_test(y);
        if take {
            self.addr = addr16;
            self.value_hi = (self.regs.pc >> 8) as u8;
            self.value_lo = self.regs.pc as u8;
            self.queue.push(MicroOp::Internal { ticks: 1 });
            self.queue.push(MicroOp::WriteStackHi { extra: 0 });
            self.queue.push(MicroOp::WriteStackLo { extra: 0 });
            self.queue.push(MicroOp::Execute);
            self.followup_stage = 1;
        }
    }

    // ------------------------------------------------------------------
    // CB-prefixed table: rotates/shifts, BIT, RES, SET.
    // ------------------------------------------------------------------

    fn decode_cb(&mut self, opcode: u8) {
        let x = (opcode >> 6) & 3;
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;
        self.operand_y = y;
        self.operand_z = z;

        if z == 6 {
            self.addr = self.regs.hl();
            self.queue.push(MicroOp::ReadMem);
            self.queue.push(MicroOp::Execute);
            self.queue.push(MicroOp::Internal { ticks: 1 });
            if x != 1 {
                self.queue.push(MicroOp::WriteMem { extra: 0 });
            }
            return;
        }

        match x {
            0 => {
                let v = self.r8_get(z);
                let r = self.apply_rot(y, v);
                self.r8_set(z, r);
            }
            1 => {
                let v = self.r8_get(z);
                self.regs.f = self.bit_flags(y, v, v);
            }
            2 => {
                let v = self.r8_get(z) & !(1 << y);
                self.r8_set(z, v);
            }
            _ => {
                let v = self.r8_get(z) | (1 << y);
                self.r8_set(z, v);
            }
        }
    }

    fn execute_cb(&mut self) {
        let x = (self.opcode >> 6) & 3;
        let y = self.operand_y;
        match x {
            0 => self.value_lo = self.apply_rot(y, self.value_lo),
            1 => {
                let wz_hi = (self.regs.wz >> 8) as u8;
                self.regs.f = self.bit_flags(y, self.value_lo, wz_hi);
            }
            2 => self.value_lo &= !(1 << y),
            _ => self.value_lo |= 1 << y,
        }
    }

    // ------------------------------------------------------------------
    // DD/FD-prefixed table: IX/IY substitution over the unprefixed table,
    // plus the handful of opcodes with their own dedicated index-register
    // form (ADD IX,rp, INC/DEC IX, the stack/exchange/jump forms, and the
    // `(IX+d)` 8-bit loads/ALU/INC/DEC).
    // ------------------------------------------------------------------

    fn decode_dd_fd(&mut self, opcode: u8) {
        match opcode {
            0x21 | 0x22 | 0x2A => {
                self.queue.push(MicroOp::ReadImm16Lo);
                self.queue.push(MicroOp::ReadImm16Hi);
                self.queue.push(MicroOp::Execute);
            }
            0x23 => {
                self.set_hl_like(self.hl_like().wrapping_add(1));
                self.queue.push(MicroOp::Internal { ticks: 2 });
            }
            0x2B => {
                self.set_hl_like(self.hl_like().wrapping_sub(1));
                self.queue.push(MicroOp::Internal { ticks: 2 });
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                let p = (opcode >> 4) & 3;
                let a = self.rp_get(p);
                let hl = self.hl_like();
                let (result, flags) = alu::add16(hl, a);
                self.set_hl_like(result);
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | (flags & (YF | HF | XF | NF | CF));
                self.regs.wz = hl.wrapping_add(1);
                self.queue.push(MicroOp::Internal { ticks: 7 });
            }
            0x34 | 0x35 => {
                self.queue.push(MicroOp::FetchDisplacement);
                self.queue.push(MicroOp::Internal { ticks: 5 });
                self.queue.push(MicroOp::ReadMem);
                self.queue.push(MicroOp::Execute);
                self.queue.push(MicroOp::Internal { ticks: 1 });
                self.queue.push(MicroOp::WriteMem { extra: 0 });
            }
            0x36 => {
                self.queue.push(MicroOp::FetchDisplacement);
                self.queue.push(MicroOp::ReadImm8);
                self.queue.push(MicroOp::Internal { ticks: 2 });
                self.queue.push(MicroOp::WriteMem { extra: 0 });
            }
            0xE1 => {
                self.queue.push(MicroOp::ReadStackLo { extra: 0 });
                self.queue.push(MicroOp::ReadStackHi { extra: 0 });
                self.queue.push(MicroOp::Execute);
            }
            0xE5 => {
                self.value_hi = (self.hl_like() >> 8) as u8;
                self.value_lo = self.hl_like() as u8;
                self.queue.push(MicroOp::Internal { ticks: 1 });
                self.queue.push(MicroOp::WriteStackHi { extra: 0 });
                self.queue.push(MicroOp::WriteStackLo { extra: 0 });
            }
            0xE3 => {
                self.addr = self.regs.sp;
                self.queue.push(MicroOp::ReadStackLo { extra: 0 });
                self.queue.push(MicroOp::ReadStackHi { extra: 0 });
                self.queue.push(MicroOp::Execute);
                self.queue.push(MicroOp::Internal { ticks: 1 });
                self.queue.push(MicroOp::WriteStackHi { extra: 0 });
                self.queue.push(MicroOp::WriteStackLo { extra: 2 });
            }
            0xE9 => self.regs.pc = self.hl_like(),
            0xF9 => {
                self.regs.sp = self.hl_like();
                self.queue.push(MicroOp::Internal { ticks: 2 });
            }
            0x24 | 0x25 | 0x26 | 0x2C | 0x2D | 0x2E => {
                // `INC`/`DEC`/`LD n` on H or L (undocumented IXH/IXL/IYH/IYL
                // forms): these reference H/L directly via the opcode's `y`
                // field, so unlike the other register-direct ops the index
                // substitution still applies.
                self.decode_unprefixed(opcode);
            }
            0x40..=0x7F if opcode != 0x76 => self.decode_dd_fd_ld(opcode),
            0x80..=0xBF => self.decode_dd_fd_alu(opcode),
            _ => {
                // Doesn't reference H/L/(HL): DD/FD is simply wasted.
                self.index_reg = 0;
                self.decode_unprefixed(opcode);
            }
        }
    }

    fn decode_dd_fd_ld(&mut self, opcode: u8) {
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;
        self.operand_y = y;
        self.operand_z = z;
        match (y == 6, z == 6) {
            (false, false) => {
                let v = self.r8_get(z);
                self.r8_set(y, v);
            }
            (false, true) => {
                self.queue.push(MicroOp::FetchDisplacement);
                self.queue.push(MicroOp::Internal { ticks: 5 });
                self.queue.push(MicroOp::ReadMem);
                self.queue.push(MicroOp::Execute);
            }
            (true, false) => {
                self.queue.push(MicroOp::FetchDisplacement);
                self.queue.push(MicroOp::Internal { ticks: 5 });
                self.value_lo = self.r8_get_plain(z);
                self.queue.push(MicroOp::WriteMem { extra: 0 });
            }
            (true, true) => unreachable!("0x76 excluded by the caller"),
        }
    }

    fn decode_dd_fd_alu(&mut self, opcode: u8) {
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;
        self.operand_y = y;
        if z == 6 {
            self.queue.push(MicroOp::FetchDisplacement);
            self.queue.push(MicroOp::Internal { ticks: 5 });
            self.queue.push(MicroOp::ReadMem);
            self.queue.push(MicroOp::Execute);
        } else {
            let v = self.r8_get(z);
            self.apply_alu(y, v);
        }
    }

    fn execute_dd_fd(&mut self) {
        let opcode = self.opcode;
        match opcode {
            0x21 => {
                let v = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                self.set_hl_like(v);
            }
            0x22 => {
                let target = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                self.addr = target;
                self.regs.wz = target.wrapping_add(1);
                let hl = self.hl_like();
                self.value_lo = hl as u8;
                self.value_hi = (hl >> 8) as u8;
                self.queue.push(MicroOp::WriteMem16Lo);
                self.queue.push(MicroOp::WriteMem16Hi);
            }
            0x2A => {
                if self.followup_stage == 1 {
                    let v = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                    self.set_hl_like(v);
                    self.followup_stage = 0;
                    return;
                }
                let target = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                self.addr = target;
                self.regs.wz = target.wrapping_add(1);
                self.queue.push(MicroOp::ReadMem16Lo);
                self.queue.push(MicroOp::ReadMem16Hi);
                self.queue.push(MicroOp::Execute);
                self.followup_stage = 1;
            }
            0x34 | 0x35 => {
                let dec = opcode == 0x35;
                let r = if dec { alu::dec8(self.value_lo) } else { alu::inc8(self.value_lo) };
                self.regs.f = r.flags;
                self.value_lo = r.value;
            }
            0x36 => self.value_lo = self.value_hi,
            0x40..=0x7F => {
                if !(self.operand_y == 6) && self.operand_z == 6 {
                    self.r8_set_plain(self.operand_y, self.value_lo);
                }
            }
            0x80..=0xBF => self.apply_alu(self.operand_y, self.value_lo),
            0xE1 => {
                let v = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                self.set_hl_like(v);
            }
            0xE3 => {
                let popped = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                let hl = self.hl_like();
                self.set_hl_like(popped);
                self.value_hi = (hl >> 8) as u8;
                self.value_lo = hl as u8;
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // DD-CB/FD-CB four-byte forms (§4.4): the final opcode byte always
    // addresses `(IX+d)`/`(IY+d)`; a non-6 `z` additionally copies the
    // computed result into that register (undocumented).
    // ------------------------------------------------------------------

    fn execute_ddcb_fdcb(&mut self) {
        if self.followup_stage == 0 {
            let opcode = self.value_hi;
            self.opcode = opcode;
            self.last_key = Some(DecodeKey::DoublePrefixed(self.prefix, self.prefix2, opcode));
            self.operand_y = (opcode >> 3) & 7;
            self.operand_z = opcode & 7;
            self.queue.push(MicroOp::ReadMem);
            self.queue.push(MicroOp::Execute);
            if (opcode >> 6) & 3 != 1 {
                self.queue.push(MicroOp::WriteMem { extra: 0 });
            }
            log::debug!(
                "OCF concluded: key={}, pipeline depth {}",
                self.last_key.unwrap(),
                self.queue.pending_len()
            );
            self.followup_stage = 1;
            return;
        }

        let opcode = self.opcode;
        let x = (opcode >> 6) & 3;
        let y = self.operand_y;
        let z = self.operand_z;

        match x {
            0 => {
                let r = self.apply_rot(y, self.value_lo);
                self.value_lo = r;
                if z != 6 {
                    self.r8_set_plain(z, r);
                }
            }
            1 => {
                let wz_hi = (self.regs.wz >> 8) as u8;
                self.regs.f = self.bit_flags(y, self.value_lo, wz_hi);
            }
            2 => {
                self.value_lo &= !(1 << y);
                if z != 6 {
                    self.r8_set_plain(z, self.value_lo);
                }
            }
            _ => {
                self.value_lo |= 1 << y;
                if z != 6 {
                    self.r8_set_plain(z, self.value_lo);
                }
            }
        }
        self.followup_stage = 0;
    }

    // ------------------------------------------------------------------
    // ED-prefixed table: I/O, 16-bit ADC/SBC/LD (nn), block instructions,
    // interrupt-mode/refresh-register ops, RRD/RLD.
    // ------------------------------------------------------------------

    fn decode_ed(&mut self, opcode: u8) {
        match opcode {
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                self.operand_y = (opcode >> 3) & 7;
                self.addr = (u16::from(self.regs.b) << 8) | u16::from(self.regs.c);
                self.queue.push(MicroOp::IoRead);
                self.queue.push(MicroOp::Execute);
            }
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                let y = (opcode >> 3) & 7;
                self.addr = (u16::from(self.regs.b) << 8) | u16::from(self.regs.c);
                self.value_lo = if y == 6 { 0 } else { self.r8_get(y) };
                self.queue.push(MicroOp::IoWrite);
            }
            0x42 | 0x52 | 0x62 | 0x72 => {
                let p = (opcode >> 4) & 3;
                let a = self.rp_get(p);
                let hl = self.regs.hl();
                let (result, flags) = alu::sbc16(hl, a, self.regs.getflag(b'C'));
                self.regs.set_hl(result);
                self.regs.f = flags;
                self.regs.wz = hl.wrapping_add(1);
                self.queue.push(MicroOp::Internal { ticks: 7 });
            }
            0x4A | 0x5A | 0x6A | 0x7A => {
                let p = (opcode >> 4) & 3;
                let a = self.rp_get(p);
                let hl = self.regs.hl();
                let (result, flags) = alu::adc16(hl, a, self.regs.getflag(b'C'));
                self.regs.set_hl(result);
                self.regs.f = flags;
                self.regs.wz = hl.wrapping_add(1);
                self.queue.push(MicroOp::Internal { ticks: 7 });
            }
            0x43 | 0x53 | 0x63 | 0x73 | 0x4B | 0x5B | 0x6B | 0x7B => {
                self.queue.push(MicroOp::ReadImm16Lo);
                self.queue.push(MicroOp::ReadImm16Hi);
                self.queue.push(MicroOp::Execute);
            }
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let r = alu::neg8(self.regs.a);
                self.regs.a = r.value;
                self.regs.f = r.flags;
            }
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                self.queue.push(MicroOp::ReadStackLo { extra: 0 });
                self.queue.push(MicroOp::ReadStackHi { extra: 0 });
                self.queue.push(MicroOp::Execute);
            }
            0x46 | 0x4E | 0x66 | 0x6E => self.regs.im = 0,
            0x56 | 0x76 => self.regs.im = 1,
            0x5E | 0x7E => self.regs.im = 2,
            0x47 => {
                self.regs.i = self.regs.a;
                self.queue.push(MicroOp::Internal { ticks: 1 });
            }
            0x4F => {
                self.regs.r = self.regs.a;
                self.queue.push(MicroOp::Internal { ticks: 1 });
            }
            0x57 => {
                self.regs.a = self.regs.i;
                self.regs.f =
                    (self.regs.f & CF) | sz53(self.regs.a) | if self.regs.iff2 { PF } else { 0 };
                self.queue.push(MicroOp::Internal { ticks: 1 });
            }
            0x5F => {
                self.regs.a = self.regs.r;
                self.regs.f =
                    (self.regs.f & CF) | sz53(self.regs.a) | if self.regs.iff2 { PF } else { 0 };
                self.queue.push(MicroOp::Internal { ticks: 1 });
            }
            0x67 | 0x6F => {
                self.addr = self.regs.hl();
                self.queue.push(MicroOp::ReadMem);
                self.queue.push(MicroOp::Execute);
                self.queue.push(MicroOp::Internal { ticks: 4 });
                self.queue.push(MicroOp::WriteMem { extra: 0 });
            }
            0xA0..=0xA3 | 0xA8..=0xAB | 0xB0..=0xB3 | 0xB8..=0xBB => self.decode_ed_block(opcode),
            _ => {} // Unassigned ED opcode: behaves as an 8 T-state NOP.
        }
    }

    fn decode_ed_block(&mut self, opcode: u8) {
        let decrement = opcode & 0x08 != 0;
        let repeat = opcode & 0x10 != 0;
        self.followup_stage = u8::from(decrement) | (u8::from(repeat) << 1);
        match opcode & 0x03 {
            2 => {
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.addr = (u16::from(self.regs.b) << 8) | u16::from(self.regs.c);
                self.queue.push(MicroOp::Internal { ticks: 1 });
                self.queue.push(MicroOp::IoRead);
                self.queue.push(MicroOp::Execute);
            }
            _ => {
                self.addr = self.regs.hl();
                self.queue.push(MicroOp::ReadMem);
                self.queue.push(MicroOp::Execute);
            }
        }
    }

    fn execute_ed(&mut self, io: &mut dyn IoBus) {
        let opcode = self.opcode;

        match opcode {
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let y = self.operand_y;
                self.regs.f = (self.regs.f & CF) | sz53p(self.value_lo);
                if y != 6 {
                    self.r8_set(y, self.value_lo);
                }
                self.regs.wz = self.addr.wrapping_add(1);
            }
            0x43 | 0x53 | 0x63 | 0x73 => {
                let p = (opcode >> 4) & 3;
                let target = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                self.addr = target;
                self.regs.wz = target.wrapping_add(1);
                let v = self.rp_get(p);
                self.value_lo = v as u8;
                self.value_hi = (v >> 8) as u8;
                self.queue.push(MicroOp::WriteMem16Lo);
                self.queue.push(MicroOp::WriteMem16Hi);
            }
            0x4B | 0x5B | 0x6B | 0x7B => {
                if self.followup_stage > 0 {
                    let p = self.followup_stage - 1;
                    let v = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                    self.rp_set(p, v);
                    self.followup_stage = 0;
                    return;
                }
                let p = (opcode >> 4) & 3;
                let target = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                self.addr = target;
                self.regs.wz = target.wrapping_add(1);
                self.queue.push(MicroOp::ReadMem16Lo);
                self.queue.push(MicroOp::ReadMem16Hi);
                self.queue.push(MicroOp::Execute);
                self.followup_stage = p + 1;
            }
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                self.regs.pc = u16::from(self.value_lo) | (u16::from(self.value_hi) << 8);
                self.regs.wz = self.regs.pc;
                self.regs.iff1 = self.regs.iff2;
            }
            0x67 => {
                let (a, m) = (self.regs.a, self.value_lo);
                let new_m = ((a & 0x0F) << 4) | ((m >> 4) & 0x0F);
                let new_a = (a & 0xF0) | (m & 0x0F);
                self.regs.a = new_a;
                self.value_lo = new_m;
                self.regs.f = (self.regs.f & CF) | sz53p(new_a);
                self.regs.wz = self.addr.wrapping_add(1);
            }
            0x6F => {
                let (a, m) = (self.regs.a, self.value_lo);
                let new_m = ((m << 4) & 0xF0) | (a & 0x0F);
                let new_a = (a & 0xF0) | ((m >> 4) & 0x0F);
                self.regs.a = new_a;
                self.value_lo = new_m;
                self.regs.f = (self.regs.f & CF) | sz53p(new_a);
                self.regs.wz = self.addr.wrapping_add(1);
            }
            0xA0..=0xA3 | 0xA8..=0xAB | 0xB0..=0xB3 | 0xB8..=0xBB => {
                self.execute_ed_block(opcode, io);
            }
            _ => {}
        }
    }

    fn execute_ed_block(&mut self, opcode: u8, io: &mut dyn IoBus) {
        let decrement = self.followup_stage & 1 != 0;
        let repeat = self.followup_stage & 2 != 0;
        let step: u16 = if decrement { 0xFFFF } else { 1 };

        match opcode & 0x03 {
            0 => {
                // LDI/LDD/LDIR/LDDR
                let transferred = self.value_lo;
                self.addr = self.regs.de();
                self.value_lo = transferred;
                self.regs.set_hl(self.regs.hl().wrapping_add(step));
                self.regs.set_de(self.regs.de().wrapping_add(step));
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));

                let n = self.regs.a.wrapping_add(transferred);
                let mut flags = self.regs.f & (SF | ZF | CF);
                if self.regs.bc() != 0 {
                    flags |= PF;
                }
                flags |= n & XF;
                if n & 0x02 != 0 {
                    flags |= YF;
                }
                self.regs.f = flags;

                self.queue.push(MicroOp::WriteMem { extra: 2 });
                if repeat && self.regs.bc() != 0 {
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                    self.queue.push(MicroOp::Internal { ticks: 5 });
                }
            }
            1 => {
                // CPI/CPD/CPIR/CPDR
                let value = self.value_lo;
                let diff = self.regs.a.wrapping_sub(value);
                let half_borrow = (self.regs.a & 0x0F) < (value & 0x0F);
                self.regs.set_bc(self.regs.bc().wrapping_sub(1));
                self.regs.set_hl(self.regs.hl().wrapping_add(step));
                self.regs.wz = self.regs.wz.wrapping_add(step);

                let mut flags = NF | (self.regs.f & CF);
                flags |= sz53(diff) & (SF | ZF);
                if half_borrow {
                    flags |= HF;
                }
                let n = diff.wrapping_sub(u8::from(half_borrow));
                flags |= n & XF;
                if n & 0x02 != 0 {
                    flags |= YF;
                }
                if self.regs.bc() != 0 {
                    flags |= PF;
                }
                self.regs.f = flags;

                self.queue.push(MicroOp::Internal { ticks: 5 });
                if repeat && self.regs.bc() != 0 && diff != 0 {
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.regs.wz = self.regs.pc.wrapping_add(1);
                    self.queue.push(MicroOp::Internal { ticks: 5 });
                }
            }
            2 => {
                // INI/IND/INIR/INDR
                let value = self.value_lo;
                self.addr = self.regs.hl();
                self.regs.set_hl(self.regs.hl().wrapping_add(step));
                self.queue.push(MicroOp::WriteMem { extra: 0 });

                self.regs.wz = self.regs.bc().wrapping_add(step);
                let c_adj = if decrement { self.regs.c.wrapping_sub(1) } else { self.regs.c.wrapping_add(1) };
                let k = u16::from(value).wrapping_add(u16::from(c_adj));
                let mut flags = sz53(self.regs.b);
                if value & 0x80 != 0 {
                    flags |= NF;
                }
                if k > 0xFF {
                    flags |= HF | CF;
                }
                if parity((k as u8 & 7) ^ self.regs.b) {
                    flags |= PF;
                }
                self.regs.f = flags;

                if repeat && self.regs.b != 0 {
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.queue.push(MicroOp::Internal { ticks: 5 });
                }
            }
            _ => {
                // OUTI/OUTD/OTIR/OTDR
                let value = self.value_lo;
                self.regs.set_hl(self.regs.hl().wrapping_add(step));
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.addr = (u16::from(self.regs.b) << 8) | u16::from(self.regs.c);
                self.queue.push(MicroOp::Internal { ticks: 1 });
                self.queue.push(MicroOp::IoWrite);

                self.regs.wz = self.regs.bc().wrapping_add(step);
                let l = self.regs.hl() as u8;
                let k = u16::from(value).wrapping_add(u16::from(l));
                let mut flags = sz53(self.regs.b);
                if value & 0x80 != 0 {
                    flags |= NF;
                }
                if k > 0xFF {
                    flags |= HF | CF;
                }
                if parity((k as u8 & 7) ^ self.regs.b) {
                    flags |= PF;
                }
                self.regs.f = flags;

                if repeat && self.regs.b != 0 {
                    self.regs.pc = self.regs.pc.wrapping_sub(2);
                    self.queue.push(MicroOp::Internal { ticks: 5 });
                }
            }
        }
        let _ = io;
    }
}
