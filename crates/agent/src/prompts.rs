//! System prompts, rendered from tera templates compiled once at startup.

use anyhow::{Context as _, Result};
use brewline_core::{OrderSnapshot, RecommendationEngine};
use serde::Serialize;
use tera::{Context, Tera};

pub const SHOP_NAME: &str = "Version Coffee";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub name: &'static str,
    pub price: &'static str,
}

/// Fixed price list the guard and order-taking prompts are built from.
pub const MENU: [MenuItem; 18] = [
    MenuItem { name: "Cappuccino", price: "4.50" },
    MenuItem { name: "Jumbo Savory Scone", price: "3.25" },
    MenuItem { name: "Latte", price: "4.75" },
    MenuItem { name: "Chocolate Chip Biscotti", price: "2.50" },
    MenuItem { name: "Espresso Shot", price: "2.00" },
    MenuItem { name: "Hazelnut Biscotti", price: "2.75" },
    MenuItem { name: "Chocolate Croissant", price: "3.75" },
    MenuItem { name: "Cranberry Scone", price: "3.50" },
    MenuItem { name: "Croissant", price: "3.25" },
    MenuItem { name: "Almond Croissant", price: "4.00" },
    MenuItem { name: "Ginger Biscotti", price: "2.50" },
    MenuItem { name: "Oatmeal Scone", price: "3.25" },
    MenuItem { name: "Ginger Scone", price: "3.50" },
    MenuItem { name: "Chocolate Syrup", price: "1.50" },
    MenuItem { name: "Hazelnut Syrup", price: "1.50" },
    MenuItem { name: "Caramel Syrup", price: "1.50" },
    MenuItem { name: "Sugar Free Vanilla Syrup", price: "1.50" },
    MenuItem { name: "Dark Chocolate", price: "3.00" },
];

const GUARD: &str = r#"You are a guard agent for a coffee shop application.

The coffee shop is called "{{ shop }}".

The user is allowed to ask for:
- General questions about {{ shop }} (the shop)
- Menu items, prices, ingredients. The items are:
{% for item in menu %}    - {{ item.name }}
{% endfor %}- Recommendations
- Shop info (location, hours, delivery, about us)
- Placing/completing orders
- Confirming items ("that's all", "yes please")

NOT allowed:
- Unrelated content
- Staff questions or recipes

Output JSON with "chain_of_thought" (your reasoning), "decision" ("allowed" or
"not allowed") and "message" ("" if allowed, else a short polite refusal).
"#;

const CLASSIFIER: &str = r#"You are a router for the {{ shop }} chatbot. Choose the right agent:

1. details_agent: Questions about the shop (location, hours, menu info)
2. order_taking_agent: Taking and managing orders
3. recommendation_agent: Product recommendations

Output JSON with "chain_of_thought" (which agent fits and why), "decision"
("details_agent", "order_taking_agent" or "recommendation_agent") and
"message" ("").
"#;

const DETAILS: &str = r#"You are an assistant for the {{ shop }} coffee shop.
Answer based on this context:

Context: {{ context }}
Question: {{ question }}
"#;

const ORDER_TAKING: &str = r#"You are a customer support bot for the {{ shop }} coffee shop.

Menu:
{% for item in menu %}- {{ item.name }} - ${{ item.price }}
{% endfor %}
Process:
1. Take the order
2. Validate items are on menu
3. Ask if they need anything else
4. When done, list items, calculate total, tell the user to press the 'Check Out' button to finalise the order, and thank them

Output JSON with "chain_of_thought" (your reasoning), "step_number" (current
step), "order" (a list of {"item", "quantity", "price"} using menu prices) and
"response" (the message to the user).
"#;

const ORDER_PREAMBLE: &str = r#"step number: {{ step_number }}
order: {{ order }}
total: ${{ total }}
"#;

const RECOMMENDATION_CLASSIFICATION: &str = r#"Determine recommendation type:
1. apriori: Based on items user mentioned
2. popular: General popular items
3. popular by category: Popular in specific category

Items: {{ products | join(sep=",") }}
Categories: {{ categories | join(sep=",") }}

Output JSON with "chain_of_thought" (reasoning), "recommendation_type"
("apriori", "popular" or "popular by category") and "parameters" (list of
items or categories).
"#;

const RECOMMENDATION_PRESENTATION: &str = r#"You are a helpful AI assistant for a coffee shop application which serves drinks and pastries.
Your task is to recommend items to the user based on their input message. Respond in a friendly but concise way, as an unordered list with a very small description of each item.

I will provide you with a list of items to recommend to the user based on their input message.
"#;

const ORDER_RECOMMENDATION: &str = r#"You are a recommendation assistant for the {{ shop }} coffee shop.

Your recommendation is a follow up from the order taking agent, so just recommend the items without any description.
The order taking agent will conclude the message, so there is no need to thank the user.
Format each product name as a separate markdown bullet point (- item).
"#;

const RECOMMENDATION_REQUEST: &str = r#"{{ message }}

Please recommend these items: {{ items | join(sep=", ") }}"#;

pub struct PromptLibrary {
    tera: Tera,
}

impl PromptLibrary {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("guard", GUARD),
            ("classifier", CLASSIFIER),
            ("details", DETAILS),
            ("order_taking", ORDER_TAKING),
            ("order_preamble", ORDER_PREAMBLE),
            ("recommendation_classification", RECOMMENDATION_CLASSIFICATION),
            ("recommendation_presentation", RECOMMENDATION_PRESENTATION),
            ("order_recommendation", ORDER_RECOMMENDATION),
            ("recommendation_request", RECOMMENDATION_REQUEST),
        ])
        .context("prompt templates failed to compile")?;
        Ok(Self { tera })
    }

    pub fn guard(&self) -> Result<String> {
        self.render("guard", shop_context())
    }

    pub fn classifier(&self) -> Result<String> {
        self.render("classifier", shop_context())
    }

    pub fn details(&self, context: &str, question: &str) -> Result<String> {
        let mut ctx = shop_context();
        ctx.insert("context", context);
        ctx.insert("question", question);
        self.render("details", ctx)
    }

    pub fn order_taking(&self) -> Result<String> {
        self.render("order_taking", shop_context())
    }

    /// Prior order state, prepended to the latest user message.
    pub fn order_preamble(&self, snapshot: &OrderSnapshot) -> Result<String> {
        let order = serde_json::to_string(&snapshot.order).context("order did not serialize")?;
        let mut ctx = Context::new();
        ctx.insert("step_number", &snapshot.step_number);
        ctx.insert("order", &order);
        ctx.insert("total", &snapshot.total().round_dp(2).to_string());
        self.render("order_preamble", ctx)
    }

    pub fn recommendation_classification(&self, engine: &RecommendationEngine) -> Result<String> {
        let mut ctx = Context::new();
        ctx.insert("products", &engine.products());
        ctx.insert("categories", &engine.categories());
        self.render("recommendation_classification", ctx)
    }

    pub fn recommendation_presentation(&self) -> Result<String> {
        self.render("recommendation_presentation", shop_context())
    }

    pub fn order_recommendation(&self) -> Result<String> {
        self.render("order_recommendation", shop_context())
    }

    /// The user's latest message followed by the items to present.
    pub fn recommendation_request(&self, message: &str, items: &[String]) -> Result<String> {
        let mut ctx = Context::new();
        ctx.insert("message", message);
        ctx.insert("items", items);
        self.render("recommendation_request", ctx)
    }

    fn render(&self, name: &str, context: Context) -> Result<String> {
        self.tera
            .render(name, &context)
            .with_context(|| format!("prompt template `{name}` failed to render"))
    }
}

fn shop_context() -> Context {
    let mut ctx = Context::new();
    ctx.insert("shop", SHOP_NAME);
    ctx.insert("menu", &MENU);
    ctx
}

#[cfg(test)]
mod tests {
    use brewline_core::{
        AffinityTable, OrderLine, OrderSnapshot, PopularityRow, PopularityTable,
        RecommendationEngine,
    };
    use rust_decimal::Decimal;

    use super::{PromptLibrary, MENU};

    fn library() -> PromptLibrary {
        PromptLibrary::new().expect("templates should compile")
    }

    #[test]
    fn guard_and_order_prompts_list_the_whole_menu() {
        let prompts = library();
        let guard = prompts.guard().expect("guard renders");
        let order_taking = prompts.order_taking().expect("order taking renders");

        for item in MENU {
            assert!(guard.contains(item.name), "guard prompt missing {}", item.name);
            assert!(order_taking.contains(&format!("- {} - ${}", item.name, item.price)));
        }
        assert!(guard.contains("Version Coffee"));
        assert!(order_taking.contains("'Check Out'"));
    }

    #[test]
    fn preamble_carries_step_order_and_total() {
        let snapshot = OrderSnapshot {
            step_number: "3".to_string(),
            order: vec![OrderLine {
                item: "Latte".to_string(),
                quantity: 2,
                price: Decimal::new(475, 2),
            }],
            asked_recommendation_before: true,
        };
        let preamble = library().order_preamble(&snapshot).expect("preamble renders");

        assert!(preamble.contains("step number: 3"));
        assert!(preamble.contains(r#""item":"Latte""#));
        assert!(preamble.contains("total: $9.50"));
    }

    #[test]
    fn recommendation_prompts_embed_vocabulary_and_items() {
        let engine = RecommendationEngine::new(
            AffinityTable::default(),
            PopularityTable::from_rows(vec![
                PopularityRow {
                    product: "Latte".to_string(),
                    product_category: "Coffee".to_string(),
                    number_of_transactions: 10,
                },
                PopularityRow {
                    product: "Croissant".to_string(),
                    product_category: "Bakery".to_string(),
                    number_of_transactions: 5,
                },
            ]),
        );
        let prompts = library();

        let classification =
            prompts.recommendation_classification(&engine).expect("classification renders");
        assert!(classification.contains("Items: Latte,Croissant"));
        assert!(classification.contains("Categories: Bakery,Coffee"));

        let request = prompts
            .recommendation_request(
                "what goes with a latte?",
                &["Croissant".to_string(), "Biscotti".to_string()],
            )
            .expect("request renders");
        assert_eq!(
            request,
            "what goes with a latte?\n\nPlease recommend these items: Croissant, Biscotti"
        );
    }
}
