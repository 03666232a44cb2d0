use crate::error::FetchError;
use crate::market::types::{
    BidOfferTotals, ChangeDirection, OrderBookRow, PriceClass, QuoteSnapshot, RawQuotePayload,
    RawRow, RawSideTotal, SideTotals,
};

pub fn classify_price(price: &str, previous: f64) -> PriceClass {
    let Ok(value) = price.trim().parse::<f64>() else {
        return PriceClass::Neutral;
    };
    if !value.is_finite() {
        return PriceClass::Neutral;
    }

    if value > previous {
        PriceClass::Above
    } else if value < previous {
        PriceClass::Below
    } else {
        PriceClass::Equal
    }
}

fn change_direction(change: f64) -> ChangeDirection {
    if change >= 0.0 {
        ChangeDirection::Up
    } else {
        ChangeDirection::Down
    }
}

fn map_row(row: RawRow, previous: f64) -> OrderBookRow {
    let price_class = classify_price(&row.price, previous);
    OrderBookRow {
        price: row.price,
        que_num: row.que_num,
        volume: row.volume,
        change_percentage: row.change_percentage,
        price_class,
    }
}

fn map_side_total(total: RawSideTotal) -> SideTotals {
    SideTotals {
        frequency: total.freq,
        lot: total.lot,
    }
}

/// Normalizes an order book response. Values are copied through untouched;
/// only the price classes and change direction are derived.
pub fn reduce(payload: RawQuotePayload) -> Result<QuoteSnapshot, FetchError> {
    let data = payload.data.ok_or_else(|| {
        FetchError::MalformedPayload("order book response has no data object".to_string())
    })?;

    let previous = data.previous;
    let bids = data
        .bid
        .into_iter()
        .map(|row| map_row(row, previous))
        .collect();
    let offers = data
        .offer
        .into_iter()
        .map(|row| map_row(row, previous))
        .collect();

    Ok(QuoteSnapshot {
        symbol: data.symbol,
        last_price: data.lastprice,
        change: data.change,
        percentage_change: data.percentage_change,
        change_direction: change_direction(data.change),
        open: data.open,
        high: data.high,
        low: data.low,
        previous,
        volume: data.volume,
        value: data.value,
        frequency: data.frequency,
        average: data.average,
        bids,
        offers,
        totals: BidOfferTotals {
            bid: map_side_total(data.total_bid_offer.bid),
            offer: map_side_total(data.total_bid_offer.offer),
        },
    })
}

fn fit_to_width(rows: &[OrderBookRow], width: usize) -> Vec<OrderBookRow> {
    let mut fitted: Vec<OrderBookRow> = rows.iter().take(width).cloned().collect();
    fitted.resize_with(width, OrderBookRow::placeholder);
    fitted
}

/// Truncates or right-pads both sides to exactly `width` rows.
pub fn align_depth(
    bids: &[OrderBookRow],
    offers: &[OrderBookRow],
    width: usize,
) -> (Vec<OrderBookRow>, Vec<OrderBookRow>) {
    (fit_to_width(bids, width), fit_to_width(offers, width))
}

impl QuoteSnapshot {
    pub fn depth(&self, width: usize) -> (Vec<OrderBookRow>, Vec<OrderBookRow>) {
        align_depth(&self.bids, &self.offers, width)
    }
}
