//! Fixture builders and store seeding for tests.

use rust_decimal::Decimal;

use marlow_domain::{
    Instrument, Order, Price, Quantity, SecurityType, Side, TradeDate,
};
use marlow_rules::ExecutionMsg;
use marlow_store::MemoryStore;

/// A USD equity instrument on XNAS.
pub fn equity(instrument_id: &str, isin: &str) -> Instrument {
    Instrument {
        instrument_id: instrument_id.to_string(),
        security_type: SecurityType::Equity,
        isin: isin.to_string(),
        currency: "USD".to_string(),
        venue: "XNAS".to_string(),
    }
}

/// An equity instrument in an explicit currency.
pub fn equity_in(instrument_id: &str, isin: &str, currency: &str) -> Instrument {
    Instrument { currency: currency.to_string(), ..equity(instrument_id, isin) }
}

/// A client order.
pub fn order(order_id: &str, account_id: &str, instrument_id: &str, side: Side, qty: Decimal) -> Order {
    Order {
        order_id: order_id.to_string(),
        account_id: account_id.to_string(),
        instrument_id: instrument_id.to_string(),
        side,
        qty: Quantity::new(qty).expect("fixture qty"),
        trader: "tr-fixture".to_string(),
    }
}

/// A feed message for a fill.
pub fn fill(
    exec_id: &str,
    order_id: &str,
    instrument_id: &str,
    qty: Decimal,
    price: Decimal,
    trade_date: &str,
) -> ExecutionMsg {
    ExecutionMsg {
        exec_id: exec_id.to_string(),
        order_id: order_id.to_string(),
        instrument_id: instrument_id.to_string(),
        qty,
        price,
        trade_date: trade_date.to_string(),
        venue: "XNAS".to_string(),
    }
}

/// Parse a `YYYYMMDD` fixture date.
pub fn date(s: &str) -> TradeDate {
    TradeDate::parse(s).expect("fixture date")
}

/// A strictly positive fixture price.
pub fn price(value: Decimal) -> Price {
    Price::new(value).expect("fixture price")
}

/// A non-negative fixture quantity.
pub fn qty(value: Decimal) -> Quantity {
    Quantity::new(value).expect("fixture qty")
}

/// Seed reference data (instruments and orders) in one transaction.
pub fn seed_reference_data(store: &MemoryStore, instruments: &[Instrument], orders: &[Order]) {
    let mut tx = store.begin();
    for instrument in instruments {
        tx.upsert_instrument(instrument.clone());
    }
    for order in orders {
        tx.upsert_order(order.clone());
    }
    tx.commit().expect("seed commit");
}
