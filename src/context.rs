//! Transaction context for one input's script evaluation
//!
//! Borrows the spending transaction and the outputs it spends. The caller
//! supplies the spent outputs; this crate never looks them up.

use crate::error::ScriptError;
use crate::types::{Input, Output, Transaction};

#[derive(Debug, Clone, Copy)]
pub struct ScriptExecutionContext<'a> {
    tx: &'a Transaction,
    input_index: usize,
    spent_output: &'a Output,
    spent_outputs: Option<&'a [Output]>,
}

impl<'a> ScriptExecutionContext<'a> {
    /// Context knowing only the output spent by `input_index`.
    pub fn new(
        tx: &'a Transaction,
        input_index: usize,
        spent_output: &'a Output,
    ) -> Result<Self, ScriptError> {
        if input_index >= tx.inputs.len() {
            return Err(ScriptError::InvalidTxInputIndex);
        }
        Ok(Self {
            tx,
            input_index,
            spent_output,
            spent_outputs: None,
        })
    }

    /// Context with the outputs spent by every input, in input order.
    pub fn with_spent_outputs(
        tx: &'a Transaction,
        input_index: usize,
        spent_outputs: &'a [Output],
    ) -> Result<Self, ScriptError> {
        if spent_outputs.len() != tx.inputs.len() {
            return Err(ScriptError::ContextUnavailable);
        }
        let spent_output = spent_outputs
            .get(input_index)
            .ok_or(ScriptError::InvalidTxInputIndex)?;
        Ok(Self {
            tx,
            input_index,
            spent_output,
            spent_outputs: Some(spent_outputs),
        })
    }

    pub fn tx(&self) -> &'a Transaction {
        self.tx
    }

    pub fn input_index(&self) -> usize {
        self.input_index
    }

    pub fn input(&self) -> &'a Input {
        &self.tx.inputs[self.input_index]
    }

    pub fn spent_output(&self) -> &'a Output {
        self.spent_output
    }

    pub fn spent_outputs(&self) -> Option<&'a [Output]> {
        self.spent_outputs
    }

    /// Output spent by input `index`.
    pub fn utxo(&self, index: usize) -> Result<&'a Output, ScriptError> {
        if index >= self.tx.inputs.len() {
            return Err(ScriptError::InvalidTxInputIndex);
        }
        if index == self.input_index {
            return Ok(self.spent_output);
        }
        self.spent_outputs
            .and_then(|outputs| outputs.get(index))
            .ok_or(ScriptError::ContextUnavailable)
    }
}
