//! Built-in restaurant menus.

use async_trait::async_trait;
use rand::Rng;
use takeout_client::{ClientError, MenuProvider};
use tracing::info;

const MCDONALDS: &str = "McDonalds 1. Big Mac - $5.99\n2. Quarter Pounder with Cheese - $6.49\n\
3. McChicken - $3.99\n4. Filet-O-Fish - $4.99\n5. 10 pc Chicken McNuggets - $5.49\n\
6. Double Cheeseburger - $3.49\n7. Large Fries - $3.29\n8. McFlurry - $3.99\n\
9. Egg McMuffin - $4.29\n10. Happy Meal - $4.99";

const DOMINOS: &str = "Dominos 1. Pepperoni Pizza - $12.99\n2. Margherita Pizza - $10.99\n\
3. BBQ Chicken Pizza - $13.99\n4. Veggie Pizza - $11.99\n5. Meat Lovers Pizza - $14.99\n\
6. Hawaiian Pizza - $12.99\n7. Buffalo Chicken Pizza - $13.99\n8. Cheese Pizza - $9.99\n\
9. Supreme Pizza - $14.99\n10. Bacon Cheeseburger Pizza - $13.99";

const TACO_BELL: &str = "Taco Bell 1. Crunchwrap Supreme - $4.99\n2. Chalupa Supreme - $3.99\n\
3. Crunchy Taco - $1.89\n4. Soft Taco - $1.89\n5. Burrito Supreme - $4.49\n\
6. Quesadilla - $4.79\n7. Nachos BellGrande - $5.29\n8. Mexican Pizza - $4.99\n\
9. Cheesy Gordita Crunch - $4.69\n10. Cinnamon Twists - $1.49";

/// Minutes quoted for an order, inclusive.
const ESTIMATE_MINUTES: std::ops::RangeInclusive<u32> = 10..=30;

/// The menu shipped for a default restaurant identity.
pub fn builtin_menu(name: &str) -> Option<&'static str> {
    match name {
        "McDonalds" => Some(MCDONALDS),
        "Dominos" => Some(DOMINOS),
        "Taco Bell" => Some(TACO_BELL),
        _ => None,
    }
}

/// Serves a fixed menu and quotes a random preparation time.
pub struct KitchenMenu {
    name: String,
    text: String,
}

impl KitchenMenu {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

#[async_trait]
impl MenuProvider for KitchenMenu {
    fn menu(&self) -> String {
        self.text.clone()
    }

    async fn estimate(&mut self, selection: &str) -> Result<String, ClientError> {
        let minutes = rand::thread_rng().gen_range(ESTIMATE_MINUTES);
        info!(restaurant = %self.name, selection, minutes, "order accepted");
        Ok(format!("Your order will be ready in {minutes} minutes."))
    }
}
