//! Functions reading the clock of the dynamic context. The values are fixed
//! for the lifetime of a context so repeated calls agree.

use super::CallCtx;
use crate::error::Error;
use crate::xdm::{XdmAtomicValue, XdmItem, XdmSequence};

pub fn current_date_time<'a>(ctx: &CallCtx<'_, 'a>, _args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let now = ctx.context.env.current_datetime;
    Ok(vec![XdmItem::Atomic(XdmAtomicValue::DateTime { value: now.naive_local(), tz: Some(*now.offset()) })])
}

pub fn current_date<'a>(ctx: &CallCtx<'_, 'a>, _args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let now = ctx.context.env.current_datetime;
    Ok(vec![XdmItem::Atomic(XdmAtomicValue::Date { date: now.date_naive(), tz: Some(*now.offset()) })])
}

pub fn current_time<'a>(ctx: &CallCtx<'_, 'a>, _args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let now = ctx.context.env.current_datetime;
    Ok(vec![XdmItem::Atomic(XdmAtomicValue::Time { time: now.time(), tz: Some(*now.offset()) })])
}

pub fn implicit_timezone<'a>(ctx: &CallCtx<'_, 'a>, _args: &[XdmSequence<'a>]) -> Result<XdmSequence<'a>, Error> {
    let seconds = ctx.context.env.implicit_timezone.local_minus_utc();
    Ok(vec![XdmItem::Atomic(XdmAtomicValue::DayTimeDuration(i64::from(seconds) * 1000))])
}
