//! Host side of the control plane.
//!
//! [`HostPort`] is a cycle-level AXI-Lite master with one outstanding
//! transaction. [`HostDriver`] wraps a [`Platform`] and offers blocking
//! register and job helpers that step the platform until each transaction or
//! job finishes, within a cycle budget.
//!
//! # Usage
//!
//! ```ignore
//! let mut host = platform.host(10_000);
//! host.load_bitstream(&job)?;
//! let status = host.read_reg(RegisterModule::DfxController, dfx::STATUS)?;
//! ```

use thiserror::Error;

use crate::control::dfx::{DfxCommand, DfxErrorCode, DfxState};
use crate::device::axi::{AxiResp, LiteMasterSignals, LiteSlaveSignals};
use crate::device::registers::{LiteAddress, RegisterModule};
use crate::device::registers_spec::{dfx, intc};

use super::platform::Platform;

/// Host-driver failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("AXI-Lite {op} at 0x{addr:04x} returned {resp:?}")]
    Response { op: &'static str, addr: u32, resp: AxiResp },
    #[error("{what} did not finish within {cycles} cycles")]
    Timeout { what: &'static str, cycles: u64 },
    #[error("host port already has a transaction in flight")]
    PortBusy,
    #[error("DFX job failed: {0}")]
    JobFailed(DfxErrorCode),
    #[error("DFX job aborted")]
    Aborted,
}

/// One AXI-Lite transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOp {
    Write { addr: u32, data: u32, strobe: u8 },
    Read { addr: u32 },
}

impl HostOp {
    fn name(&self) -> &'static str {
        match self {
            HostOp::Write { .. } => "write",
            HostOp::Read { .. } => "read",
        }
    }

    fn addr(&self) -> u32 {
        match *self {
            HostOp::Write { addr, .. } | HostOp::Read { addr } => addr,
        }
    }
}

/// Result of a finished transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCompletion {
    pub op: HostOp,
    pub resp: AxiResp,
    /// Read data (0 for writes)
    pub data: u32,
}

/// AXI-Lite master with a single outstanding transaction.
#[derive(Debug, Clone, Default)]
pub struct HostPort {
    out: LiteMasterSignals,
    current: Option<HostOp>,
    completion: Option<HostCompletion>,
    transactions: u64,
}

impl HostPort {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn outputs(&self) -> LiteMasterSignals {
        self.out
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    /// Start a transaction; it goes on the bus at the next cycle.
    pub fn issue(&mut self, op: HostOp) -> Result<(), HostError> {
        if self.current.is_some() {
            return Err(HostError::PortBusy);
        }
        self.out = match op {
            HostOp::Write { addr, data, strobe } => LiteMasterSignals {
                awvalid: true,
                awaddr: addr,
                wvalid: true,
                wdata: data,
                wstrb: strobe,
                bready: true,
                ..Default::default()
            },
            HostOp::Read { addr } => LiteMasterSignals {
                arvalid: true,
                araddr: addr,
                rready: true,
                ..Default::default()
            },
        };
        self.current = Some(op);
        self.completion = None;
        Ok(())
    }

    /// Take the result of the last finished transaction.
    pub fn take_completion(&mut self) -> Option<HostCompletion> {
        self.completion.take()
    }

    /// Advance one cycle against the routed slave signals.
    pub fn tick(&mut self, slave: &LiteSlaveSignals) {
        let Some(op) = self.current else {
            return;
        };
        let mut next = self.out;

        match op {
            HostOp::Write { .. } => {
                if self.out.awvalid && slave.awready && slave.wready {
                    next.awvalid = false;
                    next.wvalid = false;
                } else if !self.out.awvalid && slave.bvalid && self.out.bready {
                    next.bready = false;
                    self.finish(op, slave.bresp, 0);
                }
            }
            HostOp::Read { .. } => {
                if self.out.arvalid && slave.arready {
                    next.arvalid = false;
                } else if !self.out.arvalid && slave.rvalid && self.out.rready {
                    next.rready = false;
                    self.finish(op, slave.rresp, slave.rdata);
                }
            }
        }

        self.out = next;
    }

    fn finish(&mut self, op: HostOp, resp: AxiResp, data: u32) {
        log::trace!("host: {} 0x{:04x} -> {:?} 0x{:08x}", op.name(), op.addr(), resp, data);
        self.current = None;
        self.transactions += 1;
        self.completion = Some(HostCompletion { op, resp, data });
    }
}

/// Parameters of a LOAD job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadJob {
    pub partition: u32,
    /// Address of the bitstream header
    pub addr: u64,
    /// Payload bytes (header excluded)
    pub size_bytes: u32,
    pub bitstream_id: u32,
    pub timeout: u32,
}

/// Blocking host helpers over a platform.
pub struct HostDriver<'a> {
    platform: &'a mut Platform,
    /// Cycle budget per transaction or job
    budget: u64,
}

impl Platform {
    /// Blocking host access with a per-operation cycle budget.
    pub fn host(&mut self, budget: u64) -> HostDriver<'_> {
        HostDriver { platform: self, budget }
    }
}

impl<'a> HostDriver<'a> {
    pub fn platform(&mut self) -> &mut Platform {
        self.platform
    }

    fn transact(&mut self, op: HostOp) -> Result<HostCompletion, HostError> {
        self.platform.host_port_mut().issue(op)?;
        for _ in 0..self.budget {
            self.platform.step();
            if let Some(done) = self.platform.host_port_mut().take_completion() {
                if !done.resp.is_ok() {
                    return Err(HostError::Response { op: op.name(), addr: op.addr(), resp: done.resp });
                }
                return Ok(done);
            }
        }
        Err(HostError::Timeout { what: "AXI-Lite transaction", cycles: self.budget })
    }

    /// Byte-strobed register write.
    pub fn write_reg_strobed(
        &mut self,
        module: RegisterModule,
        index: usize,
        data: u32,
        strobe: u8,
    ) -> Result<(), HostError> {
        let addr = LiteAddress::encode(module, index);
        self.transact(HostOp::Write { addr, data, strobe }).map(|_| ())
    }

    pub fn write_reg(&mut self, module: RegisterModule, index: usize, data: u32) -> Result<(), HostError> {
        self.write_reg_strobed(module, index, data, 0xF)
    }

    pub fn read_reg(&mut self, module: RegisterModule, index: usize) -> Result<u32, HostError> {
        let addr = LiteAddress::encode(module, index);
        self.transact(HostOp::Read { addr }).map(|done| done.data)
    }

    fn write_dfx(&mut self, index: usize, data: u32) -> Result<(), HostError> {
        self.write_reg(RegisterModule::DfxController, index, data)
    }

    fn start(&mut self, command: DfxCommand) -> Result<(), HostError> {
        self.write_dfx(dfx::CTRL, dfx::CTRL_START | (command.bits() << dfx::CTRL_COMMAND_SHIFT))
    }

    /// Program the job registers and issue START without waiting.
    pub fn start_load(&mut self, job: &LoadJob) -> Result<(), HostError> {
        self.write_dfx(dfx::RP_SELECT, job.partition)?;
        self.write_dfx(dfx::BS_ADDR_LOW, job.addr as u32)?;
        self.write_dfx(dfx::BS_ADDR_HIGH, (job.addr >> 32) as u32)?;
        self.write_dfx(dfx::BS_SIZE, job.size_bytes)?;
        self.write_dfx(dfx::BS_ID, job.bitstream_id)?;
        self.write_dfx(dfx::TIMEOUT, job.timeout)?;
        self.start(DfxCommand::Load)
    }

    /// Program and run a LOAD job, returning the cycles it took.
    pub fn load_bitstream(&mut self, job: &LoadJob) -> Result<u64, HostError> {
        let begin = self.platform.cycle();
        self.start_load(job)?;
        self.wait_idle()?;
        Ok(self.platform.cycle() - begin)
    }

    /// Restart a partition's core without loading a bitstream.
    pub fn reset_partition(&mut self, partition: u32) -> Result<u64, HostError> {
        let begin = self.platform.cycle();
        self.write_dfx(dfx::RP_SELECT, partition)?;
        self.start(DfxCommand::Reset)?;
        self.wait_idle()?;
        Ok(self.platform.cycle() - begin)
    }

    /// Poll STATUS until the controller leaves its busy states.
    ///
    /// Ends with `JobFailed` or `Aborted` if the controller stopped in ERROR.
    pub fn wait_idle(&mut self) -> Result<u32, HostError> {
        let deadline = self.platform.cycle() + self.budget;
        loop {
            let status = self.read_reg(RegisterModule::DfxController, dfx::STATUS)?;
            if status & dfx::STATUS_BUSY == 0 {
                let state = (status >> dfx::STATUS_STATE_SHIFT) & dfx::STATUS_STATE_MASK;
                if state == DfxState::Error.code() {
                    let code = self.read_reg(RegisterModule::DfxController, dfx::ERROR)?;
                    return Err(match DfxErrorCode::from_code(code) {
                        Some(DfxErrorCode::None) => HostError::Aborted,
                        Some(code) => HostError::JobFailed(code),
                        None => HostError::JobFailed(DfxErrorCode::SystemError),
                    });
                }
                return Ok(status);
            }
            if self.platform.cycle() >= deadline {
                return Err(HostError::Timeout { what: "DFX job", cycles: self.budget });
            }
        }
    }

    pub fn clear_error(&mut self) -> Result<(), HostError> {
        self.write_dfx(dfx::CTRL, dfx::CTRL_CLEAR_ERROR)
    }

    pub fn abort(&mut self) -> Result<(), HostError> {
        self.write_dfx(dfx::CTRL, dfx::CTRL_ABORT)
    }

    pub fn soft_reset(&mut self) -> Result<(), HostError> {
        self.write_dfx(dfx::CTRL, dfx::CTRL_SW_RESET)
    }

    /// Enable DFX interrupt sources.
    pub fn enable_dfx_interrupts(&mut self, mask: u32) -> Result<(), HostError> {
        self.write_dfx(dfx::INT_ENABLE, mask)
    }

    /// Set the interrupt controller's cause enables and global enable.
    pub fn enable_interrupts(&mut self, causes: u32) -> Result<(), HostError> {
        self.write_reg(RegisterModule::InterruptController, intc::INT_ENABLE, causes)?;
        self.write_reg(RegisterModule::InterruptController, intc::CTRL, intc::CTRL_GLOBAL_ENABLE)
    }

    /// Broadcast a global pause/stop/resume (one `intc::CTRL_*_ALL` bit).
    ///
    /// The global enable bit is preserved.
    pub fn global_command(&mut self, command: u32) -> Result<(), HostError> {
        let ctrl = self.read_reg(RegisterModule::InterruptController, intc::CTRL)?;
        let value = (ctrl & intc::CTRL_GLOBAL_ENABLE) | (command & intc::CTRL_SELF_CLEARING);
        self.write_reg(RegisterModule::InterruptController, intc::CTRL, value)
    }

    /// Send a pause/stop/resume (`intc::CORE_CTRL_*`) to one core.
    pub fn core_command(&mut self, core: u32, command: u32) -> Result<(), HostError> {
        self.write_reg(RegisterModule::InterruptController, intc::CORE_SELECT, core)?;
        self.write_reg(RegisterModule::InterruptController, intc::CORE_CTRL, command)
    }

    /// Clear interrupt causes and per-core pending flags (write-1-to-clear).
    pub fn clear_interrupts(&mut self, mask: u32) -> Result<(), HostError> {
        self.write_reg(RegisterModule::InterruptController, intc::INT_CLEAR, mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_transaction() {
        let mut port = HostPort::new();
        port.issue(HostOp::Write { addr: 0x1000, data: 5, strobe: 0xF }).unwrap();
        assert!(port.outputs().awvalid && port.outputs().wvalid);
        assert_eq!(port.issue(HostOp::Read { addr: 0 }), Err(HostError::PortBusy));

        port.tick(&LiteSlaveSignals::ready());
        assert!(!port.outputs().awvalid);
        assert!(port.take_completion().is_none());

        port.tick(&LiteSlaveSignals { bvalid: true, ..Default::default() });
        let done = port.take_completion().unwrap();
        assert_eq!(done.resp, AxiResp::Okay);
        assert!(!port.is_busy());
    }

    #[test]
    fn test_read_holds_until_accepted() {
        let mut port = HostPort::new();
        port.issue(HostOp::Read { addr: 0x4 }).unwrap();
        port.tick(&LiteSlaveSignals::default());
        assert!(port.outputs().arvalid);

        port.tick(&LiteSlaveSignals { arready: true, ..Default::default() });
        port.tick(&LiteSlaveSignals { rvalid: true, rdata: 0xAB, ..Default::default() });
        assert_eq!(port.take_completion().map(|c| c.data), Some(0xAB));
    }
}
