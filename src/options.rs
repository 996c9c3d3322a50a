use crate::types::{Dimensions, StockOption, StockType, VariantKind};

/// Expands stock types into one option per physical unit.
///
/// With `allow_sub_variants`, every unit additionally yields its half-width,
/// half-height and quarter variants (for shapes that have them), each priced
/// proportionally and each a distinct unit.
pub fn generate_options<D: Dimensions>(
    types: &[StockType<D>],
    allow_sub_variants: bool,
) -> Vec<StockOption<D>> {
    let mut options = Vec::new();
    for stock in types {
        for unit in 1..=stock.count {
            options.push(StockOption {
                id: format!("{}_{}", stock.id, unit),
                source_id: stock.id.clone(),
                variant: VariantKind::Original,
                size: stock.size,
                price: stock.price,
            });

            if !allow_sub_variants {
                continue;
            }
            for kind in VariantKind::SPLITS {
                if let Some(size) = stock.size.split(kind) {
                    options.push(StockOption {
                        id: format!("{}_{}_{}", stock.id, kind, unit),
                        source_id: stock.id.clone(),
                        variant: kind,
                        size,
                        price: stock.price / kind.price_divisor(),
                    });
                }
            }
        }
    }
    options
}
