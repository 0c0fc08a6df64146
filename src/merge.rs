// Validation, de-duplication and ranking of provider output

use std::collections::{hash_map::Entry, HashMap};

use crate::models::{BackendRecord, Query, RankedHotel};

pub fn is_valid(record: &BackendRecord, query: &Query) -> bool {
    if record.hotel_id.is_empty()
        || record.name.is_empty()
        || record.city.is_empty()
        || record.currency.is_empty()
    {
        return false;
    }

    if record.price.is_nan() || record.price <= 0.0 {
        return false;
    }

    query.matches_city(&record.city)
}

// On an exact price tie the first record seen wins
pub fn dedupe_lowest_price<I>(records: I) -> Vec<RankedHotel>
where
    I: IntoIterator<Item = BackendRecord>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut hotels: Vec<RankedHotel> = Vec::new();

    for record in records {
        match index.entry(record.hotel_id.clone()) {
            Entry::Occupied(slot) => {
                let current = &mut hotels[*slot.get()];
                if record.price < current.price {
                    *current = record.into();
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(hotels.len());
                hotels.push(record.into());
            }
        }
    }

    hotels
}

// Ascending price, ties broken by hotel id
pub fn rank(hotels: &mut [RankedHotel]) {
    hotels.sort_by(|a, b| {
        a.price
            .total_cmp(&b.price)
            .then_with(|| a.hotel_id.cmp(&b.hotel_id))
    });
}

pub fn merge<I>(records: I, query: &Query) -> Vec<RankedHotel>
where
    I: IntoIterator<Item = BackendRecord>,
{
    let mut hotels =
        dedupe_lowest_price(records.into_iter().filter(|record| is_valid(record, query)));
    rank(&mut hotels);
    hotels
}
