//! Accepted pairs for each fs operation.

use polystore_common::Result;

use crate::context::Context;
use crate::pairs::{keys, required, IoCallback, ObjectFunc, OptionSet, Pair};

pub(crate) const NEW: OptionSet = OptionSet::new(&[], &[keys::WORK_DIR], &[keys::CONTEXT]);
pub(crate) const CONTEXT_ONLY: OptionSet = OptionSet::new(&[], &[], &[keys::CONTEXT]);
pub(crate) const READ: OptionSet = OptionSet::new(
    &[],
    &[keys::SIZE, keys::OFFSET],
    &[keys::READ_CALLBACK_FUNC, keys::CONTEXT],
);
pub(crate) const WRITE: OptionSet = OptionSet::new(
    &[],
    &[keys::SIZE],
    &[keys::READ_CALLBACK_FUNC, keys::CONTEXT],
);
pub(crate) const LIST_DIR: OptionSet = OptionSet::new(
    &[],
    &[keys::DIR_FUNC, keys::FILE_FUNC],
    &[keys::CONTEXT],
);
pub(crate) const LIST_PREFIX: OptionSet =
    OptionSet::new(&[keys::OBJECT_FUNC], &[], &[keys::CONTEXT]);

pub(crate) struct NewOptions {
    pub work_dir: Option<String>,
}

impl NewOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = NEW.parse_lenient(pairs)?;
        Ok(Self {
            work_dir: values.work_dir(),
        })
    }
}

/// Options of metadata, stat, delete, copy and move.
pub(crate) struct BasicOptions {
    pub context: Context,
}

impl BasicOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = CONTEXT_ONLY.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
        })
    }
}

pub(crate) struct ReadOptions {
    pub context: Context,
    pub size: Option<u64>,
    pub offset: Option<u64>,
    pub read_callback: Option<IoCallback>,
}

impl ReadOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = READ.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
            size: values.size(),
            offset: values.offset(),
            read_callback: values.read_callback_func(),
        })
    }
}

pub(crate) struct WriteOptions {
    pub context: Context,
    pub size: Option<u64>,
    pub read_callback: Option<IoCallback>,
}

impl WriteOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = WRITE.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
            size: values.size(),
            read_callback: values.read_callback_func(),
        })
    }
}

pub(crate) struct ListDirOptions {
    pub context: Context,
    pub dir_func: Option<ObjectFunc>,
    pub file_func: Option<ObjectFunc>,
}

impl ListDirOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = LIST_DIR.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
            dir_func: values.dir_func(),
            file_func: values.file_func(),
        })
    }
}

pub(crate) struct ListPrefixOptions {
    pub context: Context,
    pub object_func: ObjectFunc,
}

impl ListPrefixOptions {
    pub fn parse(pairs: Vec<Pair>) -> Result<Self> {
        let mut values = LIST_PREFIX.parse(pairs)?;
        Ok(Self {
            context: values.context().unwrap_or_default(),
            object_func: required(values.object_func(), keys::OBJECT_FUNC)?,
        })
    }
}
